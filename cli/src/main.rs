//! ekg: command-line front end for the event knowledge graph builder
//!
//! Reads a YAML configuration, imports record files into the embedded store
//! (or talks to a remote Neo4j server), builds the graph and runs
//! class-level aggregation.

use anyhow::Context;
use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ekg_builder::graph::PropertyValue;
use ekg_builder::{
    AggregationPolicy, AggregationRequest, DiscoveryConfig, EkgBuilder, EkgConfig, EmbeddedGateway, GatewayConfig,
    GraphGateway, RemoteGateway, Row, SemanticHeader,
};

#[derive(Parser)]
#[command(name = "ekg", version, about = "Event knowledge graph builder")]
struct Cli {
    /// Configuration file
    #[arg(long, short, default_value = "ekg.yaml", global = true, env = "EKG_CONFIG")]
    config: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, clap::ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and list the declared types
    Check,
    /// Build the graph and run the configured aggregations
    Build {
        /// Restrict construction to these types
        #[arg(long = "type")]
        types: Vec<String>,

        /// Skip the aggregations listed in the configuration
        #[arg(long)]
        skip_discovery: bool,
    },
    /// Aggregate the DF edges of one entity type into class-level edges
    Discover {
        entity_type: String,

        /// Class type components, joined with '_'
        #[arg(long = "classifier")]
        classifiers: Vec<String>,

        #[arg(long, default_value_t = 0)]
        df_threshold: u64,

        #[arg(long, default_value_t = 0.0)]
        relative_df_threshold: f64,

        /// Keep class-level self-loops
        #[arg(long)]
        keep_self_loops: bool,

        /// Refresh the count of existing class-level edges
        #[arg(long)]
        overwrite: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = EkgConfig::from_path(&cli.config)
        .with_context(|| format!("loading configuration {}", cli.config.display()))?;
    let header = SemanticHeader::from_path(&config.semantic_header)
        .with_context(|| format!("loading semantic header {}", config.semantic_header.display()))?;

    if let Commands::Check = cli.command {
        print_header(&header, &cli.format)?;
        return Ok(());
    }

    let header = Arc::new(header);
    match &config.gateway {
        GatewayConfig::Embedded => {
            let gateway = Arc::new(EmbeddedGateway::new());
            for file in &config.records {
                let count = gateway
                    .import_file(file)
                    .await
                    .with_context(|| format!("importing {}", file.path.display()))?;
                info!("Imported {} records from {}", count, file.path.display());
            }
            let builder = EkgBuilder::new(header, gateway, config.builder.clone());
            execute(cli, &config, &builder, true).await
        }
        GatewayConfig::Remote { url, .. } => {
            if !config.records.is_empty() {
                warn!("Record files are only imported into the embedded store; {} is expected to hold them", url);
            }
            let gateway = Arc::new(RemoteGateway::from_config(&config.gateway)?);
            let builder = EkgBuilder::new(header, gateway, config.builder.clone());
            execute(cli, &config, &builder, false).await
        }
    }
}

/// An embedded store starts empty, so every command builds before it reads
async fn execute<G: GraphGateway>(
    cli: &Cli,
    config: &EkgConfig,
    builder: &EkgBuilder<G>,
    embedded: bool,
) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Check => Ok(()),
        Commands::Build { types, skip_discovery } => {
            builder.build_selected(types).await?;
            if !skip_discovery {
                for discovery in &config.discovery {
                    let rows = aggregate(builder, discovery, config.builder.aggregation_policy).await?;
                    print_rows(&format!("DF_C ({})", discovery.entity_type), &rows, &cli.format)?;
                }
            }
            print_statistics(builder, &cli.format).await
        }
        Commands::Discover {
            entity_type,
            classifiers,
            df_threshold,
            relative_df_threshold,
            keep_self_loops,
            overwrite,
        } => {
            if embedded {
                builder.build().await?;
            }
            let discovery = DiscoveryConfig {
                entity_type: entity_type.clone(),
                classifiers: classifiers.clone(),
                df_threshold: *df_threshold,
                relative_df_threshold: *relative_df_threshold,
                exclude_self_loops: !keep_self_loops,
            };
            let policy = if *overwrite {
                AggregationPolicy::Overwrite
            } else {
                config.builder.aggregation_policy
            };
            let rows = aggregate(builder, &discovery, policy).await?;
            print_rows(&format!("DF_C ({})", entity_type), &rows, &cli.format)
        }
    }
}

async fn aggregate<G: GraphGateway>(
    builder: &EkgBuilder<G>,
    discovery: &DiscoveryConfig,
    policy: AggregationPolicy,
) -> anyhow::Result<Vec<Row>> {
    let request = AggregationRequest {
        classifiers: discovery.classifiers.clone(),
        df_threshold: discovery.df_threshold,
        relative_df_threshold: discovery.relative_df_threshold,
        exclude_self_loops: discovery.exclude_self_loops,
        ..Default::default()
    };
    let rows = builder
        .aggregator()
        .aggregate_with_policy(&discovery.entity_type, &request, policy)
        .await?;
    Ok(rows)
}

fn print_header(header: &SemanticHeader, format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(header)?);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["Type", "Kind", "Constructors", "Infer DF"]);
            for node in &header.nodes {
                table.add_row(vec![
                    node.name.clone(),
                    "node".to_string(),
                    node.constructors.len().to_string(),
                    node.infer_df.to_string(),
                ]);
            }
            for rel in &header.relations {
                let kind = if rel.model_as_node { "relation (node)" } else { "relation" };
                table.add_row(vec![
                    rel.name.clone(),
                    kind.to_string(),
                    rel.constructors.len().to_string(),
                    (rel.infer_df && rel.model_as_node).to_string(),
                ]);
            }
            println!("{}", table);
            println!("Semantic header '{}' is valid", header.name);
        }
    }
    Ok(())
}

fn print_rows(title: &str, rows: &[Row], format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            let json: Vec<serde_json::Value> = rows
                .iter()
                .map(|row| {
                    serde_json::Value::Object(row.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Table => {
            println!("{}", title);
            let Some(first) = rows.first() else {
                println!("(no results)");
                return Ok(());
            };
            let mut table = Table::new();
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(first.keys().cloned().collect::<Vec<_>>());
            for row in rows {
                table.add_row(row.values().map(format_table_value).collect::<Vec<_>>());
            }
            println!("{}", table);
            println!("{} row(s)", rows.len());
        }
    }
    Ok(())
}

async fn print_statistics<G: GraphGateway>(builder: &EkgBuilder<G>, format: &OutputFormat) -> anyhow::Result<()> {
    let summary = builder.statistics().await?;
    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "labels": summary.labels,
                "relationships": summary.relationships,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["Kind", "Name", "Count"]);
            for (name, count) in &summary.labels {
                table.add_row(vec!["label".to_string(), name.clone(), count.to_string()]);
            }
            for (name, count) in &summary.relationships {
                table.add_row(vec!["relationship".to_string(), name.clone(), count.to_string()]);
            }
            println!("{}", table);
        }
    }
    Ok(())
}

fn format_table_value(v: &PropertyValue) -> String {
    match v {
        PropertyValue::Null => "null".to_string(),
        PropertyValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}
