//! XML rendering of [`Envelope`]s.
//!
//! Every response is built as an [`XmlElement`] tree in the OAI-PMH default
//! namespace and then serialized. Payload subtrees (metadata, about,
//! descriptions) are embedded unchanged.

use crate::types::{
    Envelope, Header, Identify, MetadataFormat, OaiError, Record, ResponseBody, ResumptionToken,
    SetInfo, OAI_NAMESPACE, OAI_SCHEMA_LOCATION, PROTOCOL_VERSION,
};
use crate::xml::{XmlElement, XmlError};

const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Render a complete `<OAI-PMH>` document.
pub fn render_envelope(envelope: &Envelope) -> Result<String, XmlError> {
    envelope_element(envelope).to_document()
}

/// Build the `<OAI-PMH>` element for an envelope.
pub fn envelope_element(envelope: &Envelope) -> XmlElement {
    let mut request = XmlElement::new("request");
    for (name, value) in envelope.request.arguments() {
        request = request.with_attribute(name, value);
    }
    let request = request.with_text(envelope.request.base_url.as_str());

    XmlElement::new("OAI-PMH")
        .with_attribute("xmlns", OAI_NAMESPACE)
        .with_attribute("xmlns:xsi", XSI_NAMESPACE)
        .with_attribute(
            "xsi:schemaLocation",
            format!("{OAI_NAMESPACE} {OAI_SCHEMA_LOCATION}"),
        )
        .with_child(XmlElement::text_element(
            "responseDate",
            envelope.response_date.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        ))
        .with_child(request)
        .with_child(body_element(&envelope.body))
}

/// Render the body of an application (non-protocol) failure.
///
/// ```xml
/// <error code="store_backend_error">SPARQL endpoint unreachable</error>
/// ```
pub fn render_application_error(code: &str, message: &str) -> Result<String, XmlError> {
    XmlElement::new("error")
        .with_attribute("code", code)
        .with_text(message)
        .to_document()
}

fn body_element(body: &ResponseBody) -> XmlElement {
    match body {
        ResponseBody::Identify(identify) => identify_element(identify),
        ResponseBody::ListMetadataFormats(formats) => {
            let mut e = XmlElement::new("ListMetadataFormats");
            for f in formats {
                e.push(metadata_format_element(f));
            }
            e
        }
        ResponseBody::ListSets {
            sets,
            resumption_token,
        } => {
            let mut e = XmlElement::new("ListSets");
            for s in sets {
                e.push(set_element(s));
            }
            with_token(e, resumption_token.as_ref())
        }
        ResponseBody::GetRecord(record) => {
            XmlElement::new("GetRecord").with_child(record_element(record))
        }
        ResponseBody::ListIdentifiers {
            headers,
            resumption_token,
        } => {
            let mut e = XmlElement::new("ListIdentifiers");
            for h in headers {
                e.push(header_element(h));
            }
            with_token(e, resumption_token.as_ref())
        }
        ResponseBody::ListRecords {
            records,
            resumption_token,
        } => {
            let mut e = XmlElement::new("ListRecords");
            for r in records {
                e.push(record_element(r));
            }
            with_token(e, resumption_token.as_ref())
        }
        ResponseBody::Error(error) => error_element(error),
    }
}

fn identify_element(identify: &Identify) -> XmlElement {
    let mut e = XmlElement::new("Identify")
        .with_child(XmlElement::text_element(
            "repositoryName",
            identify.repository_name.as_str(),
        ))
        .with_child(XmlElement::text_element("baseURL", identify.base_url.as_str()))
        .with_child(XmlElement::text_element("protocolVersion", PROTOCOL_VERSION));
    for email in &identify.admin_emails {
        e.push(XmlElement::text_element("adminEmail", email.as_str()));
    }
    e.push(XmlElement::text_element(
        "earliestDatestamp",
        identify.earliest_datestamp.as_str(),
    ));
    e.push(XmlElement::text_element(
        "deletedRecord",
        identify.deleted_record.as_str(),
    ));
    e.push(XmlElement::text_element(
        "granularity",
        identify.granularity.as_str(),
    ));
    for c in &identify.compression {
        e.push(XmlElement::text_element("compression", c.as_str()));
    }
    for d in &identify.descriptions {
        e.push(XmlElement::new("description").with_child(d.clone()));
    }
    e
}

fn metadata_format_element(format: &MetadataFormat) -> XmlElement {
    XmlElement::new("metadataFormat")
        .with_child(XmlElement::text_element("metadataPrefix", format.prefix.as_str()))
        .with_child(XmlElement::text_element("schema", format.schema.as_str()))
        .with_child(XmlElement::text_element(
            "metadataNamespace",
            format.namespace.as_str(),
        ))
}

fn set_element(set: &SetInfo) -> XmlElement {
    let mut e = XmlElement::new("set")
        .with_child(XmlElement::text_element("setSpec", set.spec.as_str()))
        .with_child(XmlElement::text_element("setName", set.name.as_str()));
    for d in &set.descriptions {
        e.push(XmlElement::new("setDescription").with_child(d.clone()));
    }
    e
}

fn header_element(header: &Header) -> XmlElement {
    let mut e = XmlElement::new("header");
    if header.deleted {
        e = e.with_attribute("status", "deleted");
    }
    e = e
        .with_child(XmlElement::text_element("identifier", header.identifier.as_str()))
        .with_child(XmlElement::text_element("datestamp", header.datestamp.as_str()));
    for spec in &header.set_specs {
        e.push(XmlElement::text_element("setSpec", spec.as_str()));
    }
    e
}

fn record_element(record: &Record) -> XmlElement {
    let mut e = XmlElement::new("record").with_child(header_element(&record.header));
    if let Some(metadata) = &record.metadata {
        e.push(XmlElement::new("metadata").with_child(metadata.clone()));
    }
    for about in &record.about {
        e.push(XmlElement::new("about").with_child(about.clone()));
    }
    e
}

fn with_token(mut list: XmlElement, token: Option<&ResumptionToken>) -> XmlElement {
    let Some(token) = token else {
        return list;
    };
    let mut e = XmlElement::new("resumptionToken");
    if let Some(expiry) = token.expiration_date {
        e = e.with_attribute(
            "expirationDate",
            expiry.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        );
    }
    if let Some(size) = token.complete_list_size {
        e = e.with_attribute("completeListSize", size.to_string());
    }
    if let Some(cursor) = token.cursor {
        e = e.with_attribute("cursor", cursor.to_string());
    }
    if !token.value.is_empty() {
        e = e.with_text(token.value.as_str());
    }
    list.push(e);
    list
}

fn error_element(error: &OaiError) -> XmlElement {
    XmlElement::new("error")
        .with_attribute("code", error.code.as_str())
        .with_text(error.message.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeletedRecord, ErrorCode, Granularity, ProtocolRequest, Verb};
    use chrono::{TimeZone, Utc};

    fn envelope(body: ResponseBody) -> Envelope {
        Envelope {
            response_date: Utc.with_ymd_and_hms(2025, 8, 15, 12, 0, 0).unwrap(),
            request: ProtocolRequest {
                base_url: "http://localhost:8000/".into(),
                verb: Some(Verb::ListRecords),
                metadata_prefix: Some("oai_dc".into()),
                ..Default::default()
            },
            body,
        }
    }

    fn parse(env: &Envelope) -> XmlElement {
        let xml = render_envelope(env).unwrap();
        XmlElement::parse(xml.as_bytes()).unwrap()
    }

    #[test]
    fn envelope_carries_namespace_date_and_request() {
        let root = parse(&envelope(ResponseBody::Error(OaiError::no_records_match())));
        assert_eq!(root.name, "OAI-PMH");
        assert_eq!(root.attribute("xmlns"), Some(OAI_NAMESPACE));
        assert_eq!(
            root.child("responseDate").unwrap().text(),
            "2025-08-15T12:00:00Z"
        );
        let request = root.child("request").unwrap();
        assert_eq!(request.attribute("verb"), Some("ListRecords"));
        assert_eq!(request.attribute("metadataPrefix"), Some("oai_dc"));
        assert_eq!(request.text(), "http://localhost:8000/");
    }

    #[test]
    fn error_body_renders_code_attribute() {
        let root = parse(&envelope(ResponseBody::Error(OaiError::bad_verb(Some("Bogus")))));
        let error = root.child("error").unwrap();
        assert_eq!(error.attribute("code"), Some(ErrorCode::BadVerb.as_str()));
        assert!(error.text().contains("Bogus"));
    }

    #[test]
    fn records_embed_metadata_and_tombstones_omit_it() {
        let payload = XmlElement::new("rdf:RDF")
            .with_attribute("xmlns:rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#");
        let mut header = Header::new("record1", "2025-08-14");
        header.set_specs.push("a:b".into());
        let body = ResponseBody::ListRecords {
            records: vec![
                Record::new(header, payload),
                Record::tombstone(Header::new("record2", "2025-08-10")),
            ],
            resumption_token: None,
        };
        let root = parse(&envelope(body));
        let list = root.child("ListRecords").unwrap();
        let records: Vec<_> = list.children_named("record").collect();
        assert_eq!(records.len(), 2);

        let first = records[0];
        let header = first.child("header").unwrap();
        assert_eq!(header.child("identifier").unwrap().text(), "record1");
        assert_eq!(header.child("setSpec").unwrap().text(), "a:b");
        assert!(first.child("metadata").unwrap().child("RDF").is_some());

        let second = records[1];
        assert_eq!(second.child("header").unwrap().attribute("status"), Some("deleted"));
        assert!(second.child("metadata").is_none());
        assert!(list.child("resumptionToken").is_none());
    }

    #[test]
    fn identify_lists_required_elements() {
        let body = ResponseBody::Identify(Identify {
            repository_name: "Test".into(),
            base_url: "http://localhost:8000/".into(),
            admin_emails: vec!["a@example.org".into(), "b@example.org".into()],
            earliest_datestamp: "1970-01-01T00:00:00Z".into(),
            deleted_record: DeletedRecord::Transient,
            granularity: Granularity::Second,
            compression: vec![],
            descriptions: vec![XmlElement::text_element("x:note", "hi")
                .with_attribute("xmlns:x", "urn:x")],
        });
        let root = parse(&envelope(body));
        let identify = root.child("Identify").unwrap();
        assert_eq!(identify.child("protocolVersion").unwrap().text(), "2.0");
        assert_eq!(identify.children_named("adminEmail").count(), 2);
        assert_eq!(identify.child("deletedRecord").unwrap().text(), "transient");
        assert_eq!(
            identify.child("granularity").unwrap().text(),
            "YYYY-MM-DDThh:mm:ssZ"
        );
        assert_eq!(
            identify.child("description").unwrap().child("note").unwrap().text(),
            "hi"
        );
    }

    #[test]
    fn resumption_token_attributes() {
        let body = ResponseBody::ListIdentifiers {
            headers: vec![Header::new("x", "2025-01-01")],
            resumption_token: Some(ResumptionToken {
                value: String::new(),
                expiration_date: None,
                complete_list_size: Some(1),
                cursor: Some(0),
            }),
        };
        let root = parse(&envelope(body));
        let token = root
            .child("ListIdentifiers")
            .unwrap()
            .child("resumptionToken")
            .unwrap();
        assert_eq!(token.attribute("completeListSize"), Some("1"));
        assert_eq!(token.attribute("cursor"), Some("0"));
        assert_eq!(token.text(), "");
    }

    #[test]
    fn application_error_document() {
        let xml = render_application_error("internal_error", "boom").unwrap();
        let root = XmlElement::parse(xml.as_bytes()).unwrap();
        assert_eq!(root.name, "error");
        assert_eq!(root.attribute("code"), Some("internal_error"));
        assert_eq!(root.text(), "boom");
    }
}
