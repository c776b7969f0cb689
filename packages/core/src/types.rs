//! Core data types for the OAI-PMH 2.0 protocol.
//!
//! This module defines the structures that make up a protocol response:
//! [`Header`], [`Record`], [`ProtocolRequest`] (the echoed request),
//! [`ResponseBody`] and the [`Envelope`] that wraps every response. The XML
//! shape of each type is produced by [`crate::render`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::xml::XmlElement;

/// XML namespace of every OAI-PMH response element.
pub const OAI_NAMESPACE: &str = "http://www.openarchives.org/OAI/2.0/";

/// Location of the OAI-PMH 2.0 response schema.
pub const OAI_SCHEMA_LOCATION: &str = "http://www.openarchives.org/OAI/2.0/OAI-PMH.xsd";

/// The only protocol version this crate speaks.
pub const PROTOCOL_VERSION: &str = "2.0";

/// One of the six protocol operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Identify,
    ListMetadataFormats,
    ListSets,
    GetRecord,
    ListIdentifiers,
    ListRecords,
}

impl Verb {
    /// Every verb, in the order the protocol document lists them.
    pub const ALL: [Verb; 6] = [
        Verb::Identify,
        Verb::ListMetadataFormats,
        Verb::ListSets,
        Verb::GetRecord,
        Verb::ListIdentifiers,
        Verb::ListRecords,
    ];

    /// The wire name of the verb (e.g. `"ListRecords"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Identify => "Identify",
            Verb::ListMetadataFormats => "ListMetadataFormats",
            Verb::ListSets => "ListSets",
            Verb::GetRecord => "GetRecord",
            Verb::ListIdentifiers => "ListIdentifiers",
            Verb::ListRecords => "ListRecords",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses a [`Verb`] from its exact, case-sensitive wire name.
impl FromStr for Verb {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Verb::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| format!("{s:?} is not an OAI-PMH verb"))
    }
}

/// Protocol error codes defined by OAI-PMH 2.0 §3.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    BadArgument,
    BadResumptionToken,
    BadVerb,
    CannotDisseminateFormat,
    IdDoesNotExist,
    NoMetadataFormats,
    NoRecordsMatch,
    NoSetHierarchy,
}

impl ErrorCode {
    /// The `code` attribute value (e.g. `"idDoesNotExist"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BadArgument => "badArgument",
            ErrorCode::BadResumptionToken => "badResumptionToken",
            ErrorCode::BadVerb => "badVerb",
            ErrorCode::CannotDisseminateFormat => "cannotDisseminateFormat",
            ErrorCode::IdDoesNotExist => "idDoesNotExist",
            ErrorCode::NoMetadataFormats => "noMetadataFormats",
            ErrorCode::NoRecordsMatch => "noRecordsMatch",
            ErrorCode::NoSetHierarchy => "noSetHierarchy",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A protocol-level error: a valid response, not a failure of the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OaiError {
    pub code: ErrorCode,
    pub message: String,
}

impl OaiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn bad_verb(verb: Option<&str>) -> Self {
        match verb {
            Some(v) => Self::new(ErrorCode::BadVerb, format!("illegal OAI verb: {v}")),
            None => Self::new(ErrorCode::BadVerb, "the verb argument is missing"),
        }
    }

    pub fn bad_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadArgument, message)
    }

    pub fn bad_resumption_token(token: &str) -> Self {
        Self::new(
            ErrorCode::BadResumptionToken,
            format!("resumption token {token:?} is invalid; this repository does not issue resumption tokens"),
        )
    }

    pub fn cannot_disseminate_format(prefix: &str) -> Self {
        Self::new(
            ErrorCode::CannotDisseminateFormat,
            format!("metadata format {prefix:?} is not supported by this repository"),
        )
    }

    pub fn id_does_not_exist(identifier: &str) -> Self {
        Self::new(
            ErrorCode::IdDoesNotExist,
            format!("no record with identifier {identifier:?}"),
        )
    }

    pub fn no_records_match() -> Self {
        Self::new(
            ErrorCode::NoRecordsMatch,
            "the combination of arguments results in an empty list",
        )
    }

    pub fn no_set_hierarchy() -> Self {
        Self::new(
            ErrorCode::NoSetHierarchy,
            "this repository does not support sets",
        )
    }
}

impl fmt::Display for OaiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Finest datestamp granularity a repository supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Granularity {
    /// `YYYY-MM-DD`
    Day,
    /// `YYYY-MM-DDThh:mm:ssZ`
    Second,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Day => "YYYY-MM-DD",
            Granularity::Second => "YYYY-MM-DDThh:mm:ssZ",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "YYYY-MM-DD" => Ok(Granularity::Day),
            "YYYY-MM-DDThh:mm:ssZ" => Ok(Granularity::Second),
            _ => Err(format!(
                "unknown granularity {s:?}; expected YYYY-MM-DD or YYYY-MM-DDThh:mm:ssZ"
            )),
        }
    }
}

/// How a repository reports deleted records (the Identify `deletedRecord` element).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletedRecord {
    No,
    Persistent,
    Transient,
}

impl DeletedRecord {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeletedRecord::No => "no",
            DeletedRecord::Persistent => "persistent",
            DeletedRecord::Transient => "transient",
        }
    }
}

/// Identifies a harvestable item independently of its metadata payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub identifier: String,
    /// Datestamp as it will appear on the wire (`YYYY-MM-DD` or `YYYY-MM-DDThh:mm:ssZ`).
    pub datestamp: String,
    pub set_specs: Vec<String>,
    /// Rendered as `status="deleted"`.
    pub deleted: bool,
}

impl Header {
    pub fn new(identifier: impl Into<String>, datestamp: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            datestamp: datestamp.into(),
            set_specs: Vec::new(),
            deleted: false,
        }
    }
}

/// A header plus its disseminated metadata.
///
/// A record whose header is `deleted` carries no metadata (a tombstone).
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub header: Header,
    pub metadata: Option<XmlElement>,
    pub about: Vec<XmlElement>,
}

impl Record {
    pub fn new(header: Header, metadata: XmlElement) -> Self {
        Self {
            header,
            metadata: Some(metadata),
            about: Vec::new(),
        }
    }

    /// A record for a withdrawn item: deleted header, no metadata.
    pub fn tombstone(mut header: Header) -> Self {
        header.deleted = true;
        Self {
            header,
            metadata: None,
            about: Vec::new(),
        }
    }
}

/// A metadata format the repository can disseminate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataFormat {
    pub prefix: String,
    pub schema: String,
    pub namespace: String,
}

impl MetadataFormat {
    pub fn new(
        prefix: impl Into<String>,
        schema: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            schema: schema.into(),
            namespace: namespace.into(),
        }
    }
}

/// Cursor for an incomplete list. Modeled for completeness; this repository
/// returns complete lists and never constructs one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumptionToken {
    pub value: String,
    pub expiration_date: Option<DateTime<Utc>>,
    pub complete_list_size: Option<u64>,
    pub cursor: Option<u64>,
}

/// A set in the repository's set hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct SetInfo {
    pub spec: String,
    pub name: String,
    pub descriptions: Vec<XmlElement>,
}

/// Body of an Identify response.
#[derive(Debug, Clone, PartialEq)]
pub struct Identify {
    pub repository_name: String,
    pub base_url: String,
    pub admin_emails: Vec<String>,
    pub earliest_datestamp: String,
    pub deleted_record: DeletedRecord,
    pub granularity: Granularity,
    pub compression: Vec<String>,
    pub descriptions: Vec<XmlElement>,
}

/// The verb-specific part of a response. Exactly one variant per response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Identify(Identify),
    ListMetadataFormats(Vec<MetadataFormat>),
    ListSets {
        sets: Vec<SetInfo>,
        resumption_token: Option<ResumptionToken>,
    },
    GetRecord(Record),
    ListIdentifiers {
        headers: Vec<Header>,
        resumption_token: Option<ResumptionToken>,
    },
    ListRecords {
        records: Vec<Record>,
        resumption_token: Option<ResumptionToken>,
    },
    Error(OaiError),
}

impl ResponseBody {
    /// The protocol error carried by this body, if any.
    pub fn error(&self) -> Option<&OaiError> {
        match self {
            ResponseBody::Error(e) => Some(e),
            _ => None,
        }
    }
}

impl From<OaiError> for ResponseBody {
    fn from(e: OaiError) -> Self {
        ResponseBody::Error(e)
    }
}

/// The protocol request echoed in every response (`<request>`).
///
/// Only recognized arguments are kept. For `badVerb` and `badArgument`
/// responses the echo must carry the base URL alone; see [`ProtocolRequest::bare`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolRequest {
    pub base_url: String,
    pub verb: Option<Verb>,
    pub identifier: Option<String>,
    pub metadata_prefix: Option<String>,
    pub from: Option<String>,
    pub until: Option<String>,
    pub set: Option<String>,
    pub resumption_token: Option<String>,
}

impl ProtocolRequest {
    /// An echo with no arguments, only the base URL.
    pub fn bare(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// This request stripped of its arguments.
    pub fn without_arguments(&self) -> Self {
        Self::bare(self.base_url.clone())
    }

    /// Arguments as `(wire name, value)` pairs, in schema attribute order.
    pub fn arguments(&self) -> Vec<(&'static str, &str)> {
        let mut out = Vec::new();
        if let Some(verb) = self.verb {
            out.push(("verb", verb.as_str()));
        }
        let optional = [
            ("identifier", &self.identifier),
            ("metadataPrefix", &self.metadata_prefix),
            ("from", &self.from),
            ("until", &self.until),
            ("set", &self.set),
            ("resumptionToken", &self.resumption_token),
        ];
        for (name, value) in optional {
            if let Some(v) = value {
                out.push((name, v.as_str()));
            }
        }
        out
    }
}

/// The top-level `<OAI-PMH>` document.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub response_date: DateTime<Utc>,
    pub request: ProtocolRequest,
    pub body: ResponseBody,
}

impl Envelope {
    /// Wrap `body`, stamping the response with the current time.
    pub fn new(request: ProtocolRequest, body: ResponseBody) -> Self {
        Self {
            response_date: Utc::now(),
            request,
            body,
        }
    }
}
