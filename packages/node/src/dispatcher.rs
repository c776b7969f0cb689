//! Verb dispatch.
//!
//! [`dispatch`] turns raw query pairs into a response [`Envelope`]. Each verb
//! has its own handler; a handler either produces a body or fails with a
//! [`VerbError`]. Protocol errors become error envelopes. Application errors
//! (store and serialization failures) escape as [`AppError`] and are rendered
//! by the HTTP layer as `500`.

use oaipmh::validation::{validate_identifier, validate_metadata_prefix, validate_set_spec};
use oaipmh::{
    DateRange, DeletedRecord, Envelope, Identify, OaiError, ProtocolRequest, ResponseBody,
    ValidationError, Verb, XmlElement,
};

use crate::adapter::{FormatError, MetadataAdapter, MetadataFormatter};
use crate::envelope::{envelope, parse_request, DEFAULT_METADATA_PREFIX};
use crate::error::AppError;
use crate::graph::DC_NAMESPACE;
use crate::handlers::AppState;
use crate::storage::{RecordFilter, StoreError};

const OAI_DC_NAMESPACE: &str = "http://www.openarchives.org/OAI/2.0/oai_dc/";
const OAI_DC_SCHEMA: &str = "http://www.openarchives.org/OAI/2.0/oai_dc.xsd";
const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Why a verb handler did not produce a body.
#[derive(Debug)]
pub enum VerbError {
    Protocol(OaiError),
    Application(AppError),
}

impl From<OaiError> for VerbError {
    fn from(e: OaiError) -> Self {
        VerbError::Protocol(e)
    }
}

impl From<ValidationError> for VerbError {
    fn from(e: ValidationError) -> Self {
        VerbError::Protocol(OaiError::bad_argument(e.to_string()))
    }
}

impl From<AppError> for VerbError {
    fn from(e: AppError) -> Self {
        VerbError::Application(e)
    }
}

impl From<StoreError> for VerbError {
    fn from(e: StoreError) -> Self {
        VerbError::Application(AppError::Store(e))
    }
}

impl From<FormatError> for VerbError {
    fn from(e: FormatError) -> Self {
        VerbError::Application(AppError::Format(e))
    }
}

/// Answer one OAI-PMH request.
pub async fn dispatch(state: &AppState, pairs: &[(String, String)]) -> Result<Envelope, AppError> {
    let request = match parse_request(&state.config.base_url, pairs) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(code = %e.code, "rejected request: {}", e.message);
            return Ok(envelope(&ProtocolRequest::bare(&state.config.base_url), e.into()));
        }
    };
    let Some(verb) = request.verb else {
        return Ok(envelope(&request, OaiError::bad_verb(None).into()));
    };
    tracing::debug!(%verb, arguments = ?request.arguments(), "dispatching");

    let result = match verb {
        Verb::Identify => identify(state),
        Verb::ListMetadataFormats => list_metadata_formats(state, &request),
        Verb::ListSets => list_sets(&request),
        Verb::GetRecord => get_record(state, &request).await,
        Verb::ListIdentifiers => list_identifiers(state, &request).await,
        Verb::ListRecords => list_records(state, &request).await,
    };

    match result {
        Ok(body) => Ok(envelope(&request, body)),
        Err(VerbError::Protocol(e)) => {
            tracing::debug!(%verb, code = %e.code, "protocol error: {}", e.message);
            Ok(envelope(&request, e.into()))
        }
        Err(VerbError::Application(e)) => Err(e),
    }
}

// ---------------------------------------------------------------------------
// Verb handlers
// ---------------------------------------------------------------------------

fn identify(state: &AppState) -> Result<ResponseBody, VerbError> {
    let cfg = &state.config;
    let description = XmlElement::new("oai_dc:dc")
        .with_attribute("xmlns:oai_dc", OAI_DC_NAMESPACE)
        .with_attribute("xmlns:dc", DC_NAMESPACE)
        .with_attribute("xmlns:xsi", XSI_NAMESPACE)
        .with_attribute(
            "xsi:schemaLocation",
            format!("{OAI_DC_NAMESPACE} {OAI_DC_SCHEMA}"),
        )
        .with_child(XmlElement::text_element(
            "dc:description",
            cfg.description.as_str(),
        ));

    Ok(ResponseBody::Identify(Identify {
        repository_name: cfg.repository_name.clone(),
        base_url: cfg.base_url.clone(),
        admin_emails: cfg.admin_emails.clone(),
        earliest_datestamp: cfg.earliest_datestamp.clone(),
        deleted_record: DeletedRecord::Transient,
        granularity: cfg.granularity,
        compression: Vec::new(),
        descriptions: vec![description],
    }))
}

/// Every format is available for every record, so `identifier` does not
/// narrow the list.
fn list_metadata_formats(
    state: &AppState,
    request: &ProtocolRequest,
) -> Result<ResponseBody, VerbError> {
    if let Some(identifier) = &request.identifier {
        validate_identifier(identifier)?;
    }
    Ok(ResponseBody::ListMetadataFormats(state.formats.formats()))
}

fn list_sets(request: &ProtocolRequest) -> Result<ResponseBody, VerbError> {
    reject_resumption_token(request)?;
    Err(OaiError::no_set_hierarchy().into())
}

async fn get_record(state: &AppState, request: &ProtocolRequest) -> Result<ResponseBody, VerbError> {
    let identifier = request
        .identifier
        .as_deref()
        .ok_or_else(|| OaiError::bad_argument("GetRecord requires the identifier argument"))?;
    validate_identifier(identifier)?;
    let formatter = formatter(state, request)?;

    let adapter = MetadataAdapter::new(
        state.store.as_ref(),
        formatter.as_ref(),
        state.config.granularity,
    );
    adapter
        .record(&RecordFilter::identifier(identifier))
        .await?
        .map(ResponseBody::GetRecord)
        .ok_or_else(|| OaiError::id_does_not_exist(identifier).into())
}

async fn list_identifiers(
    state: &AppState,
    request: &ProtocolRequest,
) -> Result<ResponseBody, VerbError> {
    reject_resumption_token(request)?;
    let formatter = formatter(state, request)?;
    let filter = list_filter(state, request)?;

    let adapter = MetadataAdapter::new(
        state.store.as_ref(),
        formatter.as_ref(),
        state.config.granularity,
    );
    let headers = adapter.headers(&filter).await?;
    if headers.is_empty() {
        return Err(OaiError::no_records_match().into());
    }
    Ok(ResponseBody::ListIdentifiers {
        headers,
        resumption_token: None,
    })
}

async fn list_records(
    state: &AppState,
    request: &ProtocolRequest,
) -> Result<ResponseBody, VerbError> {
    reject_resumption_token(request)?;
    let formatter = formatter(state, request)?;
    let filter = list_filter(state, request)?;

    let adapter = MetadataAdapter::new(
        state.store.as_ref(),
        formatter.as_ref(),
        state.config.granularity,
    );
    let records = adapter.records(&filter).await?;
    if records.is_empty() {
        return Err(OaiError::no_records_match().into());
    }
    Ok(ResponseBody::ListRecords {
        records,
        resumption_token: None,
    })
}

// ---------------------------------------------------------------------------
// Argument handling
// ---------------------------------------------------------------------------

/// No resumption token is ever issued, so none can be valid.
fn reject_resumption_token(request: &ProtocolRequest) -> Result<(), OaiError> {
    match &request.resumption_token {
        Some(token) => Err(OaiError::bad_resumption_token(token)),
        None => Ok(()),
    }
}

/// The formatter for the requested (or default) metadata prefix.
fn formatter(
    state: &AppState,
    request: &ProtocolRequest,
) -> Result<std::sync::Arc<dyn MetadataFormatter>, VerbError> {
    let prefix = request
        .metadata_prefix
        .as_deref()
        .unwrap_or(DEFAULT_METADATA_PREFIX);
    validate_metadata_prefix(prefix)?;
    state
        .formats
        .get(prefix)
        .ok_or_else(|| OaiError::cannot_disseminate_format(prefix).into())
}

fn list_filter(state: &AppState, request: &ProtocolRequest) -> Result<RecordFilter, VerbError> {
    if let Some(identifier) = &request.identifier {
        validate_identifier(identifier)?;
    }
    if let Some(set) = &request.set {
        validate_set_spec(set)?;
    }
    let range = DateRange::parse(
        request.from.as_deref(),
        request.until.as_deref(),
        state.config.granularity,
    )?;
    Ok(RecordFilter {
        identifier: request.identifier.clone(),
        range,
        set: request.set.clone(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use oaipmh::ErrorCode;

    use super::*;
    use crate::config::NodeConfig;
    use crate::storage::memory::MemoryStore;
    use crate::storage::{HeaderRow, MetadataStore, StoredRecord};

    fn state_with(store: Arc<dyn MetadataStore>) -> AppState {
        let config = NodeConfig::from_lookup(|key| match key {
            "OAI_BASE_URL" => Some("http://localhost:8000/".into()),
            _ => None,
        })
        .unwrap();
        AppState::new(store, config)
    }

    fn state() -> AppState {
        state_with(Arc::new(MemoryStore::sample()))
    }

    async fn run(state: &AppState, raw: &[(&str, &str)]) -> Envelope {
        let pairs: Vec<_> = raw
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        dispatch(state, &pairs).await.unwrap()
    }

    fn error_code(env: &Envelope) -> Option<ErrorCode> {
        env.body.error().map(|e| e.code)
    }

    #[tokio::test]
    async fn bogus_verb_is_bad_verb_with_bare_echo() {
        let env = run(&state(), &[("verb", "Bogus"), ("identifier", "x")]).await;
        assert_eq!(error_code(&env), Some(ErrorCode::BadVerb));
        assert_eq!(env.request, ProtocolRequest::bare("http://localhost:8000/"));
    }

    #[tokio::test]
    async fn identify_reports_configuration() {
        let env = run(&state(), &[("verb", "Identify")]).await;
        let ResponseBody::Identify(identify) = env.body else {
            panic!("expected Identify");
        };
        assert_eq!(identify.repository_name, "Webarchive OAI-PMH Endpoint");
        assert_eq!(identify.base_url, "http://localhost:8000/");
        assert_eq!(identify.deleted_record, DeletedRecord::Transient);
        let description = &identify.descriptions[0];
        assert_eq!(
            description.child("description").unwrap().text(),
            "This is the OAI-PMH endpoint of the Webarchive."
        );
    }

    #[tokio::test]
    async fn list_metadata_formats_ignores_identifier() {
        let env = run(
            &state(),
            &[("verb", "ListMetadataFormats"), ("identifier", "missing")],
        )
        .await;
        let ResponseBody::ListMetadataFormats(formats) = env.body else {
            panic!("expected formats");
        };
        assert_eq!(formats.len(), 2);
    }

    #[tokio::test]
    async fn list_sets_is_always_no_set_hierarchy() {
        for args in [
            vec![("verb", "ListSets")],
            vec![("verb", "ListSets"), ("set", "music")],
        ] {
            let env = run(&state(), &args).await;
            assert_eq!(error_code(&env), Some(ErrorCode::NoSetHierarchy));
        }
    }

    #[tokio::test]
    async fn get_record_found_and_missing() {
        let s = state();
        let env = run(
            &s,
            &[("verb", "GetRecord"), ("identifier", "record1"), ("metadataPrefix", "oai_dc")],
        )
        .await;
        let ResponseBody::GetRecord(record) = &env.body else {
            panic!("expected a record, got {:?}", env.body);
        };
        assert_eq!(record.header.identifier, "record1");
        assert!(record.metadata.is_some());

        let env = run(&s, &[("verb", "GetRecord"), ("identifier", "missing")]).await;
        assert_eq!(error_code(&env), Some(ErrorCode::IdDoesNotExist));
        assert_eq!(env.request.identifier.as_deref(), Some("missing"));
    }

    #[tokio::test]
    async fn get_record_argument_errors() {
        let s = state();
        let env = run(&s, &[("verb", "GetRecord")]).await;
        assert_eq!(error_code(&env), Some(ErrorCode::BadArgument));

        let env = run(&s, &[("verb", "GetRecord"), ("identifier", "")]).await;
        assert_eq!(error_code(&env), Some(ErrorCode::BadArgument));

        let env = run(
            &s,
            &[("verb", "GetRecord"), ("identifier", "record1"), ("metadataPrefix", "marc21")],
        )
        .await;
        assert_eq!(error_code(&env), Some(ErrorCode::CannotDisseminateFormat));
    }

    #[tokio::test]
    async fn list_records_returns_everything_without_bounds() {
        let env = run(&state(), &[("verb", "ListRecords")]).await;
        let ResponseBody::ListRecords { records, resumption_token } = env.body else {
            panic!("expected records");
        };
        let ids: Vec<_> = records.iter().map(|r| r.header.identifier.as_str()).collect();
        assert_eq!(ids, ["record1", "record2"]);
        assert!(resumption_token.is_none());
        assert_eq!(env.request.metadata_prefix, None);
    }

    #[tokio::test]
    async fn list_identifiers_applies_date_range() {
        let env = run(
            &state(),
            &[("verb", "ListIdentifiers"), ("from", "2025-08-11"), ("until", "2025-08-20")],
        )
        .await;
        let ResponseBody::ListIdentifiers { headers, .. } = env.body else {
            panic!("expected headers");
        };
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].identifier, "record1");
    }

    #[tokio::test]
    async fn empty_lists_are_no_records_match() {
        let s = state();
        for verb in ["ListIdentifiers", "ListRecords"] {
            let env = run(&s, &[("verb", verb), ("from", "2030-01-01")]).await;
            assert_eq!(error_code(&env), Some(ErrorCode::NoRecordsMatch), "{verb}");
        }
    }

    #[tokio::test]
    async fn list_argument_errors() {
        let s = state();
        let cases: [&[(&str, &str)]; 5] = [
            &[("verb", "ListRecords"), ("from", "yesterday")],
            &[("verb", "ListRecords"), ("from", "2025-08-11"), ("until", "2025-08-20T00:00:00Z")],
            &[("verb", "ListRecords"), ("from", "2025-08-20"), ("until", "2025-08-11")],
            &[("verb", "ListIdentifiers"), ("set", "a::b")],
            &[("verb", "ListIdentifiers"), ("metadataPrefix", "oai dc")],
        ];
        for args in cases {
            let env = run(&s, args).await;
            assert_eq!(error_code(&env), Some(ErrorCode::BadArgument), "{args:?}");
            assert!(env.request.verb.is_none());
        }

        let env = run(&s, &[("verb", "ListRecords"), ("resumptionToken", "abc")]).await;
        assert_eq!(error_code(&env), Some(ErrorCode::BadResumptionToken));
    }

    #[tokio::test]
    async fn set_argument_is_accepted_and_ignored() {
        let env = run(&state(), &[("verb", "ListIdentifiers"), ("set", "music:jazz")]).await;
        let ResponseBody::ListIdentifiers { headers, .. } = env.body else {
            panic!("expected headers");
        };
        assert_eq!(headers.len(), 2);
    }

    struct Broken;

    #[async_trait]
    impl MetadataStore for Broken {
        async fn list_identifiers(&self, _: &RecordFilter) -> Result<Vec<HeaderRow>, StoreError> {
            Err(StoreError::Backend("endpoint unreachable".into()))
        }

        async fn list_records(&self, _: &RecordFilter) -> Result<Vec<StoredRecord>, StoreError> {
            Err(StoreError::Backend("endpoint unreachable".into()))
        }
    }

    #[tokio::test]
    async fn store_failures_are_application_errors() {
        let s = state_with(Arc::new(Broken));
        let pairs = vec![("verb".to_string(), "ListRecords".to_string())];
        let err = dispatch(&s, &pairs).await.unwrap_err();
        assert!(matches!(err, AppError::Store(StoreError::Backend(_))));

        // verbs that never touch the store are unaffected
        let env = run(&s, &[("verb", "Identify")]).await;
        assert!(env.body.error().is_none());
    }
}
