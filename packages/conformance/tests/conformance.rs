//! End-to-end conformance tests for the OAI-PMH node.
//!
//! Each test spawns an ephemeral in-process node (real TCP, real HTTP) via
//! [`oaipmh_conformance::spawn_node`] and harvests it with `reqwest`.
//!
//! # Coverage
//!
//! | Test | Behaviour |
//! |------|-----------|
//! | `bad_verb_is_a_200_error_envelope` | badVerb, bare request echo |
//! | `missing_verb_is_bad_verb` | badVerb |
//! | `identify_describes_the_repository` | Identify |
//! | `list_metadata_formats_offers_oai_dc_and_rdf` | ListMetadataFormats |
//! | `list_sets_has_no_hierarchy` | noSetHierarchy, with and without `set` |
//! | `list_records_returns_every_sample_record` | ListRecords, payload triples match the store |
//! | `get_record_and_id_does_not_exist` | GetRecord, idDoesNotExist |
//! | `list_identifiers_filters_by_date` | ListIdentifiers, `from`/`until` |
//! | `empty_range_is_no_records_match` | noRecordsMatch |
//! | `unknown_prefix_cannot_be_disseminated` | cannotDisseminateFormat |
//! | `malformed_arguments_are_bad_argument` | badArgument |
//! | `resumption_tokens_are_rejected` | badResumptionToken |
//! | `graph_store_serves_bundled_records` | local graph + query templates |
//! | `backend_failure_is_http_500` | application error |

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use oxigraph::io::{RdfFormat, RdfParser};
use oxigraph::model::Triple;
use oaipmh_conformance::{harvest, spawn_graph_node, spawn_node, spawn_sample_node};
use oaipmh_node::storage::{HeaderRow, StoredRecord};
use oaipmh_node::{MetadataStore, RecordFilter, StoreError};

#[tokio::test]
async fn bad_verb_is_a_200_error_envelope() {
    let node = spawn_sample_node().await;
    let res = harvest(&node, "verb=Bogus&identifier=record1").await;

    assert_eq!(res.status, 200);
    assert!(res.content_type.starts_with("text/xml"));
    assert_eq!(res.root.name, "OAI-PMH");
    assert_eq!(res.error_code(), Some("badVerb"));
    assert_eq!(res.request().text(), node);
    assert_eq!(res.request().attribute("verb"), None);
    assert_eq!(res.request().attribute("identifier"), None);
    assert!(res.root.child("responseDate").is_some());
}

#[tokio::test]
async fn missing_verb_is_bad_verb() {
    let node = spawn_sample_node().await;
    let res = harvest(&node, "metadataPrefix=oai_dc").await;
    assert_eq!(res.error_code(), Some("badVerb"));
}

#[tokio::test]
async fn identify_describes_the_repository() {
    let node = spawn_sample_node().await;
    let res = harvest(&node, "verb=Identify").await;

    let identify = res.root.child("Identify").expect("Identify element");
    assert_eq!(
        identify.child("repositoryName").unwrap().text(),
        "Webarchive OAI-PMH Endpoint"
    );
    assert_eq!(identify.child("baseURL").unwrap().text(), node);
    assert_eq!(identify.child("protocolVersion").unwrap().text(), "2.0");
    assert_eq!(identify.child("deletedRecord").unwrap().text(), "transient");
    assert_eq!(
        identify.child("granularity").unwrap().text(),
        "YYYY-MM-DDThh:mm:ssZ"
    );
    assert_eq!(
        identify.descendants("description")[1].text(),
        "This is the OAI-PMH endpoint of the Webarchive."
    );
    assert_eq!(res.request().attribute("verb"), Some("Identify"));
}

#[tokio::test]
async fn list_metadata_formats_offers_oai_dc_and_rdf() {
    let node = spawn_sample_node().await;
    let res = harvest(&node, "verb=ListMetadataFormats").await;

    let prefixes: Vec<String> = res
        .root
        .child("ListMetadataFormats")
        .unwrap()
        .children_named("metadataFormat")
        .map(|f| f.child("metadataPrefix").unwrap().text())
        .collect();
    assert_eq!(prefixes, ["oai_dc", "rdf"]);
}

#[tokio::test]
async fn list_sets_has_no_hierarchy() {
    let node = spawn_sample_node().await;
    for query in ["verb=ListSets", "verb=ListSets&set=music"] {
        let res = harvest(&node, query).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.error_code(), Some("noSetHierarchy"), "{query}");
    }
}

#[tokio::test]
async fn list_records_returns_every_sample_record() {
    let node = spawn_sample_node().await;
    let res = harvest(&node, "verb=ListRecords&metadataPrefix=oai_dc").await;

    let records: Vec<_> = res
        .root
        .child("ListRecords")
        .unwrap()
        .children_named("record")
        .collect();
    assert_eq!(records.len(), 2);

    let header = records[0].child("header").unwrap();
    assert_eq!(header.child("identifier").unwrap().text(), "record1");
    assert_eq!(header.child("datestamp").unwrap().text(), "2025-08-14T00:00:00Z");

    let metadata = records[0].child("metadata").unwrap();
    let rdf = metadata.elements().next().unwrap();
    assert_eq!(rdf.local_name(), "RDF");
    assert_eq!(rdf.descendants("title")[0].text(), "Record 1");
    assert_eq!(records[1].descendants("title")[0].text(), "Record 2");

    // The embedded payload is standalone RDF/XML describing the stored graph.
    let payload = rdf.to_document().unwrap();
    let triples: BTreeSet<String> = RdfParser::from_format(RdfFormat::RdfXml)
        .for_reader(payload.as_bytes())
        .map(|q| Triple::from(q.unwrap()).to_string())
        .collect();
    let expected = BTreeSet::from([
        r#"<urn:id:record1> <http://purl.org/dc/elements/1.1/title> "Record 1""#.to_string(),
    ]);
    assert_eq!(triples, expected);
}

#[tokio::test]
async fn get_record_and_id_does_not_exist() {
    let node = spawn_sample_node().await;

    let res = harvest(&node, "verb=GetRecord&identifier=record2&metadataPrefix=rdf").await;
    let record = res.root.child("GetRecord").unwrap().child("record").unwrap();
    assert_eq!(
        record.child("header").unwrap().child("identifier").unwrap().text(),
        "record2"
    );
    assert_eq!(record.descendants("title")[0].text(), "Record 2");

    let res = harvest(&node, "verb=GetRecord&identifier=nope&metadataPrefix=oai_dc").await;
    assert_eq!(res.error_code(), Some("idDoesNotExist"));
    assert_eq!(res.request().attribute("identifier"), Some("nope"));
}

#[tokio::test]
async fn list_identifiers_filters_by_date() {
    let node = spawn_sample_node().await;
    let res = harvest(
        &node,
        "verb=ListIdentifiers&metadataPrefix=oai_dc&from=2025-08-11&until=2025-08-20",
    )
    .await;

    let ids: Vec<String> = res
        .root
        .child("ListIdentifiers")
        .unwrap()
        .children_named("header")
        .map(|h| h.child("identifier").unwrap().text())
        .collect();
    assert_eq!(ids, ["record1"]);
    assert_eq!(res.request().attribute("from"), Some("2025-08-11"));
}

#[tokio::test]
async fn empty_range_is_no_records_match() {
    let node = spawn_sample_node().await;
    let res = harvest(&node, "verb=ListRecords&from=2030-01-01").await;
    assert_eq!(res.error_code(), Some("noRecordsMatch"));
    assert_eq!(res.request().attribute("from"), Some("2030-01-01"));
}

#[tokio::test]
async fn unknown_prefix_cannot_be_disseminated() {
    let node = spawn_sample_node().await;
    for query in [
        "verb=ListRecords&metadataPrefix=marc21",
        "verb=GetRecord&identifier=record1&metadataPrefix=marc21",
    ] {
        let res = harvest(&node, query).await;
        assert_eq!(res.error_code(), Some("cannotDisseminateFormat"), "{query}");
    }
}

#[tokio::test]
async fn malformed_arguments_are_bad_argument() {
    let node = spawn_sample_node().await;
    for query in [
        "verb=GetRecord&metadataPrefix=oai_dc",
        "verb=ListRecords&from=last-week",
        "verb=ListRecords&from=2025-08-20&until=2025-08-11",
        "verb=ListIdentifiers&from=2025-08-11&until=2025-08-20T00:00:00Z",
        "verb=ListRecords&identifier=a&identifier=b",
    ] {
        let res = harvest(&node, query).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.error_code(), Some("badArgument"), "{query}");
        assert_eq!(res.request().attribute("verb"), None, "{query}");
    }
}

#[tokio::test]
async fn resumption_tokens_are_rejected() {
    let node = spawn_sample_node().await;
    for verb in ["ListRecords", "ListIdentifiers"] {
        let res = harvest(&node, &format!("verb={verb}&resumptionToken=page2")).await;
        assert_eq!(res.error_code(), Some("badResumptionToken"), "{verb}");
    }
}

#[tokio::test]
async fn graph_store_serves_bundled_records() {
    let node = spawn_graph_node().await;

    let res = harvest(&node, "verb=ListIdentifiers&from=2025-01-01").await;
    let ids: Vec<String> = res
        .root
        .child("ListIdentifiers")
        .unwrap()
        .children_named("header")
        .map(|h| h.child("identifier").unwrap().text())
        .collect();
    assert_eq!(ids, ["(DE-101)1334427879"]);

    let res = harvest(
        &node,
        "verb=GetRecord&identifier=(DE-101)1334427879&metadataPrefix=rdf",
    )
    .await;
    let record = res.root.child("GetRecord").unwrap().child("record").unwrap();
    assert_eq!(
        record.child("header").unwrap().child("datestamp").unwrap().text(),
        "2025-08-14T09:30:00Z"
    );
    assert_eq!(
        record.descendants("title")[0].text(),
        "Deutsche Meteorologische Gesellschaft e.V., DMG"
    );
}

struct Unreachable;

#[async_trait]
impl MetadataStore for Unreachable {
    async fn list_identifiers(&self, _: &RecordFilter) -> Result<Vec<HeaderRow>, StoreError> {
        Err(StoreError::Backend("SPARQL endpoint unreachable".into()))
    }

    async fn list_records(&self, _: &RecordFilter) -> Result<Vec<StoredRecord>, StoreError> {
        Err(StoreError::Backend("SPARQL endpoint unreachable".into()))
    }
}

#[tokio::test]
async fn backend_failure_is_http_500() {
    let node = spawn_node(Arc::new(Unreachable)).await;

    let res = harvest(&node, "verb=ListRecords").await;
    assert_eq!(res.status, 500);
    assert_eq!(res.root.name, "error");
    assert_eq!(res.root.attribute("code"), Some("store_backend_error"));

    // protocol errors are still decided before the store is consulted
    let res = harvest(&node, "verb=ListRecords&metadataPrefix=marc21").await;
    assert_eq!(res.status, 200);
    assert_eq!(res.error_code(), Some("cannotDisseminateFormat"));
}
