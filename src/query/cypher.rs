//! Cypher rendering of statements for Neo4j-compatible stores
//!
//! Labels, relationship types and property keys are inlined with backtick
//! quoting; values travel as named parameters.

use super::statement::*;
use crate::config::AggregationPolicy;
use crate::graph::{Direction, EdgeType, Label, UNKNOWN_VALUE};
use serde_json::{json, Map, Value};
use std::fmt::Write;

/// A Cypher statement with its named parameters
#[derive(Debug, Clone, PartialEq)]
pub struct CypherQuery {
    pub text: String,
    pub parameters: Map<String, Value>,
}

impl CypherQuery {
    fn new(text: String) -> Self {
        Self { text, parameters: Map::new() }
    }

    fn param(mut self, name: &str, value: Value) -> Self {
        self.parameters.insert(name.to_string(), value);
        self
    }
}

fn quote(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn label_pattern(labels: &[Label]) -> String {
    labels.iter().map(|l| format!(":{}", quote(l.as_str()))).collect()
}

fn rel(edge_type: &EdgeType) -> String {
    quote(edge_type.as_str())
}

/// `var.a IS NOT NULL AND var.a <> $unknown AND ...`
fn usable(var: &str, identifiers: &[String]) -> String {
    identifiers
        .iter()
        .map(|id| {
            let p = format!("{}.{}", var, quote(id));
            format!("{p} IS NOT NULL AND {p} <> $unknown")
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn identity_list(var: &str, identifiers: &[String]) -> String {
    let items: Vec<String> = identifiers.iter().map(|id| format!("{}.{}", var, quote(id))).collect();
    format!("[{}]", items.join(", "))
}

/// `{a: src.a, b: src.b}`
fn identity_map(identifiers: &[String], source: impl Fn(usize, &str) -> String) -> String {
    let items: Vec<String> = identifiers
        .iter()
        .enumerate()
        .map(|(i, id)| format!("{}: {}", quote(id), source(i, id)))
        .collect();
    format!("{{{}}}", items.join(", "))
}

/// Rows `{created}` after a MERGE that tagged new elements with `_created`
fn created_tail(var: &str) -> String {
    format!(
        "WITH {var}, {var}._created IS NOT NULL AS created\n\
         REMOVE {var}._created\n\
         RETURN count(DISTINCT CASE WHEN created THEN {var} END) AS created"
    )
}

pub fn render(statement: &Statement) -> CypherQuery {
    let query = match statement {
        Statement::CountIdentities { record_labels, identifiers } => CypherQuery::new(format!(
            "MATCH (r{})\nWHERE {}\nRETURN count(DISTINCT {}) AS num_ids",
            label_pattern(record_labels),
            usable("r", identifiers),
            identity_list("r", identifiers)
        )),
        Statement::CreateNodesByRecord(n) => render_nodes_by_record(n),
        Statement::ResetProcessedRecords { record_labels } => CypherQuery::new(format!(
            "MATCH (r{})\nWHERE r.{m} IS NOT NULL\nREMOVE r.{m}\nRETURN count(r) AS reset",
            label_pattern(record_labels),
            m = PROCESSED_MARKER
        )),
        Statement::MergeNodesWithSameId { labels, identifiers } => CypherQuery::new(format!(
            "MATCH (n{})\nWHERE {}\n\
             WITH {} AS identity, n ORDER BY id(n)\n\
             WITH identity, collect(n) AS nodes WHERE size(nodes) > 1\n\
             WITH head(nodes) AS survivor, tail(nodes) AS duplicates\n\
             SET survivor.{} = true\n\
             WITH survivor, duplicates\n\
             CALL apoc.refactor.mergeNodes([survivor] + duplicates, {{properties: 'discard', mergeRels: true}}) YIELD node\n\
             RETURN sum(size(duplicates)) AS merged",
            label_pattern(labels),
            usable("n", identifiers),
            identity_list("n", identifiers),
            MERGED_MARKER
        )),
        Statement::ResetMergedNodes { labels } => CypherQuery::new(format!(
            "MATCH (n{})\nWHERE n.{m} IS NOT NULL\nREMOVE n.{m}\nRETURN count(n) AS reset",
            label_pattern(labels),
            m = MERGED_MARKER
        )),
        Statement::CountDuplicateIdentities { labels, identifiers } => CypherQuery::new(format!(
            "MATCH (n{})\nWHERE {}\n\
             WITH {} AS identity, count(n) AS copies\n\
             WHERE copies > 1\n\
             RETURN count(identity) AS duplicates",
            label_pattern(labels),
            usable("n", identifiers),
            identity_list("n", identifiers)
        )),
        Statement::CreateNodesByRelation(n) => render_nodes_by_relation(n),
        Statement::CreateRelationsByRecord(r) => CypherQuery::new(format!(
            "MATCH (r{records})\nWHERE r.{m} IS NULL\n\
             MATCH (f{from})-[:{prev}]->(r)\n\
             MATCH (t{to})-[:{prev}]->(r)\n\
             WHERE f <> t\n\
             MERGE (f)-[rel:{rel}]->(t)\n  ON CREATE SET rel._created = true\n\
             SET r.{m} = true\n{tail}",
            records = label_pattern(&r.record_labels),
            from = label_pattern(std::slice::from_ref(&r.from_label)),
            to = label_pattern(std::slice::from_ref(&r.to_label)),
            prev = PREVALENCE,
            rel = rel(&r.relation_type),
            m = PROCESSED_MARKER,
            tail = created_tail("rel")
        )),
        Statement::CreateRelationsByRelations(r) => render_relations_by_relations(r),
        Statement::InferCorrFromReifiedParents { relation_type, corr_type, event_label, use_from } => {
            let (reference, other) = if *use_from { ("f", "t") } else { ("t", "f") };
            CypherQuery::new(format!(
                "MATCH (f)-[:{rel}]->(t)\n\
                 WITH {reference} AS reference, {other} AS other\n\
                 WHERE EXISTS {{ MATCH (reference)-[:{reified}]->() }}\n\
                 MATCH (e{event})-[:{corr}]->(other)\n\
                 MERGE (e)-[c:{corr}]->(reference)\n  ON CREATE SET c._created = true\n{tail}",
                rel = rel(relation_type),
                reified = REIFIED,
                event = label_pattern(std::slice::from_ref(event_label)),
                corr = rel(corr_type),
                tail = created_tail("c")
            ))
        }
        Statement::CreateDirectlyFollows {
            entity_type,
            entity_label,
            df_label,
            event_label,
            corr_type,
            timestamp_attribute,
        } => CypherQuery::new(format!(
            "MATCH (n{entity})<-[:{corr}]-(e{event})\n\
             WITH n, e ORDER BY e.{ts}, id(e)\n\
             WITH n, collect(e) AS events\n\
             UNWIND range(0, size(events) - 2) AS i\n\
             WITH n, events[i] AS first, events[i + 1] AS second\n\
             MERGE (first)-[df:{df} {{{et}: $entity_type, {eid}: id(n)}}]->(second)\n  ON CREATE SET df._created = true\n\
             SET df.type = $df_type\n{tail}",
            entity = label_pattern(std::slice::from_ref(entity_label)),
            corr = rel(corr_type),
            event = label_pattern(std::slice::from_ref(event_label)),
            ts = quote(timestamp_attribute),
            df = rel(df_label),
            et = ENTITY_TYPE_KEY,
            eid = ENTITY_ID_KEY,
            tail = created_tail("df")
        ))
        .param("entity_type", json!(entity_type))
        .param("df_type", json!(DF_TYPE)),
        Statement::MergeDuplicateDf { entity_type, df_label } => CypherQuery::new(format!(
            "MATCH (e1)-[r:{df}]->(e2)\n\
             WHERE r.{et} = $entity_type\n\
             WITH e1, e2, collect(r) AS rels\n\
             WHERE size(rels) > 1\n\
             WITH e1, e2, rels, size(rels) AS n_rels, head(rels).{eid} AS entity_id\n\
             FOREACH (r IN rels | DELETE r)\n\
             CREATE (e1)-[:{df} {{{et}: $entity_type, {eid}: entity_id, count: n_rels, type: $df_type}}]->(e2)\n\
             RETURN count(*) AS merged",
            df = rel(df_label),
            et = ENTITY_TYPE_KEY,
            eid = ENTITY_ID_KEY
        ))
        .param("entity_type", json!(entity_type))
        .param("df_type", json!(DF_TYPE)),
        Statement::DeleteParallelDf { entity_type, df_label, parents } => {
            let mut query = CypherQuery::new(String::new());
            let mut conditions = Vec::new();
            for (i, (parent_label, parent_type)) in parents.iter().enumerate() {
                conditions.push(format!(
                    "EXISTS {{ MATCH (e1)-[p:{}]->(e2) WHERE p.{} = $parent_{} }}",
                    rel(parent_label),
                    ENTITY_TYPE_KEY,
                    i
                ));
                query = query.param(&format!("parent_{}", i), json!(parent_type));
            }
            let parallel = if conditions.is_empty() {
                "false".to_string()
            } else {
                conditions.join(" OR ")
            };
            query.text = format!(
                "MATCH (e1)-[df:{}]->(e2)\nWHERE df.{} = $entity_type AND ({})\nDELETE df\nRETURN count(*) AS deleted",
                rel(df_label),
                ENTITY_TYPE_KEY,
                parallel
            );
            query.param("entity_type", json!(entity_type))
        }
        Statement::AggregateDf(agg) => render_aggregation(agg),
        Statement::Statistics => CypherQuery::new(
            "MATCH (n) UNWIND labels(n) AS name\n\
             RETURN 'label' AS kind, name, count(*) AS count\n\
             UNION ALL\n\
             MATCH ()-[r]->()\n\
             RETURN 'relationship' AS kind, type(r) AS name, count(*) AS count"
                .to_string(),
        ),
    };
    query.param("unknown", json!(UNKNOWN_VALUE))
}

fn render_nodes_by_record(n: &NodeByRecord) -> CypherQuery {
    let mut text = format!(
        "MATCH (r{})\nWHERE {} AND r.{} IS NULL\n",
        label_pattern(&n.record_labels),
        usable("r", &n.identifiers),
        PROCESSED_MARKER
    );
    let identity = identity_map(&n.identifiers, |_, id| format!("r.{}", quote(id)));
    if n.merge {
        let _ = writeln!(
            text,
            "MERGE (n{} {})\n  ON CREATE SET n._created = true",
            label_pattern(&n.labels),
            identity
        );
    } else {
        let _ = writeln!(
            text,
            "  AND NOT EXISTS {{ MATCH (m{})-[:{}]->(r) }}\nCREATE (n{} {})\nSET n._created = true",
            label_pattern(&n.labels),
            PREVALENCE,
            label_pattern(&n.labels),
            identity
        );
    }
    for attr in &n.optional_attributes {
        let _ = writeln!(text, "SET n.{a} = coalesce(n.{a}, r.{a})", a = quote(attr));
    }
    let _ = writeln!(text, "MERGE (n)-[:{}]->(r)\nSET r.{} = true", PREVALENCE, PROCESSED_MARKER);
    let _ = writeln!(text, "WITH n, r, n._created IS NOT NULL AS created\nREMOVE n._created");
    match &n.link {
        EventLink::None => {}
        EventLink::Corr { corr_type, event_label } => {
            let _ = writeln!(
                text,
                "WITH n, r, created\nOPTIONAL MATCH (e{})-[:{}]->(r) WHERE e <> n\n\
                 FOREACH (_ IN CASE WHEN e IS NULL THEN [] ELSE [1] END | MERGE (e)-[:{}]->(n))",
                label_pattern(std::slice::from_ref(event_label)),
                PREVALENCE,
                rel(corr_type)
            );
        }
        EventLink::Observed { event_label } => {
            let _ = writeln!(
                text,
                "WITH n, r, created\nOPTIONAL MATCH (e{})-[:{}]->(r) WHERE e <> n\n\
                 FOREACH (_ IN CASE WHEN e IS NULL THEN [] ELSE [1] END | MERGE (n)-[:{}]->(e))",
                label_pattern(std::slice::from_ref(event_label)),
                PREVALENCE,
                OBSERVED
            );
        }
    }
    text.push_str(
        "RETURN count(DISTINCT CASE WHEN created THEN n END) AS created, \
         count(DISTINCT CASE WHEN NOT created THEN n END) AS matched",
    );
    CypherQuery::new(text)
}

fn render_nodes_by_relation(n: &NodeByRelation) -> CypherQuery {
    let pick = |id: &str| {
        let (f, t) = (format!("f.{}", quote(id)), format!("t.{}", quote(id)));
        format!("CASE WHEN {f} IS NOT NULL AND {f} <> $unknown THEN {f} ELSE {t} END")
    };
    let picks: Vec<String> = n.identifiers.iter().map(|id| pick(id)).collect();
    let mut text = format!(
        "MATCH (f)-[:{}]->(t)\n\
         WITH f, t, [{}] AS identity\n\
         WHERE all(v IN identity WHERE v IS NOT NULL AND v <> $unknown)\n\
         MERGE (n{} {})\n  ON CREATE SET n._created = true\n",
        rel(&n.relation_type),
        picks.join(", "),
        label_pattern(&n.labels),
        identity_map(&n.identifiers, |i, _| format!("identity[{}]", i))
    );
    for attr in &n.optional_attributes {
        let _ = writeln!(text, "SET n.{a} = coalesce(n.{a}, f.{a}, t.{a})", a = quote(attr));
    }
    let _ = writeln!(text, "WITH f, t, n, n._created IS NOT NULL AS created\nREMOVE n._created");
    if n.reify {
        let _ = writeln!(text, "MERGE (f)<-[:{r}]-(n)-[:{r}]->(t)", r = REIFIED);
    }
    if let Some((corr_type, event_label)) = &n.corr_from_parents {
        let _ = writeln!(
            text,
            "WITH f, t, n, created\nOPTIONAL MATCH (e{})-[:{c}]->(p) WHERE p = f OR p = t\n\
             FOREACH (_ IN CASE WHEN e IS NULL THEN [] ELSE [1] END | MERGE (e)-[:{c}]->(n))",
            label_pattern(std::slice::from_ref(event_label)),
            c = rel(corr_type)
        );
    }
    text.push_str(
        "RETURN count(DISTINCT CASE WHEN created THEN n END) AS created, \
         count(DISTINCT CASE WHEN NOT created THEN n END) AS matched",
    );
    CypherQuery::new(text)
}

fn render_relations_by_relations(r: &RelationByRelations) -> CypherQuery {
    let mut pattern = format!("(f{})", label_pattern(std::slice::from_ref(&r.from_label)));
    let last = r.path.len().saturating_sub(1);
    for (i, hop) in r.path.iter().enumerate() {
        let arrow = match hop.direction {
            Direction::Outgoing => format!("-[:{}]->", rel(&hop.edge_type)),
            Direction::Incoming => format!("<-[:{}]-", rel(&hop.edge_type)),
        };
        let hop_label = hop.label.as_ref().map(|l| label_pattern(std::slice::from_ref(l))).unwrap_or_default();
        let node = if i == last {
            format!("(t{}{})", label_pattern(std::slice::from_ref(&r.to_label)), hop_label)
        } else {
            format!("(h{}{})", i, hop_label)
        };
        pattern.push_str(&arrow);
        pattern.push_str(&node);
    }
    CypherQuery::new(format!(
        "MATCH {}\nWHERE f <> t\nWITH DISTINCT f, t\nMERGE (f)-[rel:{}]->(t)\n  ON CREATE SET rel._created = true\n{}",
        pattern,
        rel(&r.relation_type),
        created_tail("rel")
    ))
}

fn render_aggregation(agg: &DfAggregation) -> CypherQuery {
    let class = label_pattern(std::slice::from_ref(&agg.class_label));
    let event = label_pattern(std::slice::from_ref(&agg.event_label));
    let entity = label_pattern(std::slice::from_ref(&agg.entity_label));
    let df = rel(&agg.df_label);
    let corr = rel(&agg.corr_type);

    let mut class_filter = String::new();
    if agg.class_type.is_some() {
        class_filter.push_str(" AND c1.classType = $class_type AND c2.classType = $class_type");
    }
    if agg.exclude_self_loops {
        class_filter.push_str(" AND c1 <> c2");
    }

    let mut text = format!(
        "MATCH (c1{class})-[:{obs}]->(e1{event})-[df:{df}]->(e2{event})<-[:{obs}]-(c2{class})\n\
         WHERE df.{et} = $entity_type{class_filter}\n",
        obs = OBSERVED,
        et = ENTITY_TYPE_KEY
    );
    if agg.is_threshold_free() {
        text.push_str("WITH c1, c2, count(DISTINCT df) AS df_freq\nWHERE df_freq > 0\n");
    } else {
        let _ = write!(
            text,
            "  AND EXISTS {{ MATCH (e1)-[:{corr}]->(:{ent_bare})<-[:{corr}]-(e2) }}\n\
             WITH c1, c2, count(DISTINCT df) AS df_freq\n\
             WHERE df_freq > $df_threshold\n\
             OPTIONAL MATCH (c2)-[:{obs}]->(f1{event})-[df2:{df}]->(f2{event})<-[:{obs}]-(c1)\n\
             WHERE df2.{et} = $entity_type AND EXISTS {{ MATCH (f1)-[:{corr}]->(:{ent_bare})<-[:{corr}]-(f2) }}\n\
             WITH c1, c2, df_freq, count(DISTINCT df2) AS df_freq2\n\
             WHERE df_freq * $relative_df_threshold > df_freq2\n",
            ent_bare = entity.trim_start_matches(':'),
            obs = OBSERVED,
            et = ENTITY_TYPE_KEY
        );
    }
    let _ = write!(
        text,
        "MERGE (c1)-[rel:{} {{{}: $entity_type}}]->(c2)\n  ON CREATE SET rel.count = df_freq, rel.type = $dfc_type\n",
        rel(&agg.dfc_label),
        ENTITY_TYPE_KEY
    );
    if agg.policy == AggregationPolicy::Overwrite {
        text.push_str("  ON MATCH SET rel.count = df_freq, rel.type = $dfc_type\n");
    }
    text.push_str("RETURN id(c1) AS from_id, id(c2) AS to_id, df_freq AS count");

    let mut query = CypherQuery::new(text)
        .param("entity_type", json!(agg.entity_type))
        .param("dfc_type", json!(DFC_TYPE));
    if let Some(class_type) = &agg.class_type {
        query = query.param("class_type", json!(class_type));
    }
    if !agg.is_threshold_free() {
        query = query
            .param("df_threshold", json!(agg.df_threshold))
            .param("relative_df_threshold", json!(agg.relative_df_threshold));
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::labels;

    fn aggregation(df_threshold: u64, relative: f64) -> DfAggregation {
        DfAggregation {
            entity_type: "Resource".into(),
            entity_label: Label::new("Resource"),
            df_label: EdgeType::new("DF"),
            dfc_label: EdgeType::new("DF_C"),
            event_label: Label::new("Event"),
            class_label: Label::new("Activity"),
            corr_type: EdgeType::new("CORR"),
            class_type: None,
            df_threshold,
            relative_df_threshold: relative,
            exclude_self_loops: true,
            policy: AggregationPolicy::CreateOnly,
        }
    }

    #[test]
    fn test_quote_escapes_backticks() {
        assert_eq!(quote("Book"), "`Book`");
        assert_eq!(quote("we`ird"), "`we``ird`");
        assert_eq!(label_pattern(&labels(["Record", "BookRecord"])), ":`Record`:`BookRecord`");
    }

    #[test]
    fn test_count_identities() {
        let q = render(&Statement::CountIdentities {
            record_labels: labels(["OrderRecord"]),
            identifiers: vec!["orderId".into()],
        });
        assert!(q.text.contains("MATCH (r:`OrderRecord`)"));
        assert!(q.text.contains("count(DISTINCT [r.`orderId`]) AS num_ids"));
        assert_eq!(q.parameters["unknown"], json!("Unknown"));
    }

    #[test]
    fn test_merge_vs_create_rendering() {
        let mut n = NodeByRecord {
            record_labels: labels(["BookRecord"]),
            labels: labels(["Book"]),
            identifiers: vec!["bookId".into()],
            optional_attributes: vec!["title".into()],
            merge: true,
            link: EventLink::Corr { corr_type: EdgeType::new("CORR"), event_label: Label::new("Event") },
        };
        let merged = render(&Statement::CreateNodesByRecord(n.clone()));
        assert!(merged.text.contains("MERGE (n:`Book` {`bookId`: r.`bookId`})"));
        assert!(merged.text.contains("MERGE (e)-[:`CORR`]->(n)"));

        n.merge = false;
        let created = render(&Statement::CreateNodesByRecord(n));
        assert!(created.text.contains("CREATE (n:`Book` {`bookId`: r.`bookId`})"));
        assert!(created.text.contains("NOT EXISTS"));
    }

    #[test]
    fn test_relation_chain_pattern() {
        let q = render(&Statement::CreateRelationsByRelations(RelationByRelations {
            from_label: Label::new("Book"),
            to_label: Label::new("Publisher"),
            path: vec![
                HopPattern { edge_type: EdgeType::new("WRITTEN_BY"), direction: Direction::Outgoing, label: None },
                HopPattern {
                    edge_type: EdgeType::new("SIGNED"),
                    direction: Direction::Incoming,
                    label: Some(Label::new("Publisher")),
                },
            ],
            relation_type: EdgeType::new("PUBLISHED_BY"),
        }));
        assert!(q
            .text
            .contains("MATCH (f:`Book`)-[:`WRITTEN_BY`]->(h0)<-[:`SIGNED`]-(t:`Publisher`:`Publisher`)"));
        assert!(q.text.contains("MERGE (f)-[rel:`PUBLISHED_BY`]->(t)"));
    }

    #[test]
    fn test_aggregation_modes() {
        let free = render(&Statement::AggregateDf(aggregation(0, 0.0)));
        assert!(!free.text.contains("df_freq2"));
        assert!(free.text.contains("c1 <> c2"));
        assert!(!free.parameters.contains_key("df_threshold"));
        assert!(!free.text.contains("ON MATCH"));

        let mut with_thresholds = aggregation(2, 2.0);
        with_thresholds.policy = AggregationPolicy::Overwrite;
        with_thresholds.class_type = Some("activity".into());
        let q = render(&Statement::AggregateDf(with_thresholds));
        assert!(q.text.contains("WHERE df_freq * $relative_df_threshold > df_freq2"));
        assert!(q.text.contains("(:`Resource`)"));
        assert!(q.text.contains("ON MATCH SET rel.count = df_freq"));
        assert_eq!(q.parameters["df_threshold"], json!(2));
        assert_eq!(q.parameters["class_type"], json!("activity"));
    }

    #[test]
    fn test_delete_parallel_without_parents_deletes_nothing() {
        let q = render(&Statement::DeleteParallelDf {
            entity_type: "Authorship".into(),
            df_label: EdgeType::new("DF"),
            parents: vec![],
        });
        assert!(q.text.contains("AND (false)"));
    }
}
