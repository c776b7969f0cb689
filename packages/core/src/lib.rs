//! OAI-PMH 2.0 protocol model.
//!
//! This crate holds everything about the protocol that does not depend on
//! where records come from: the response data model, argument validation,
//! datestamp handling, and XML rendering. It performs no I/O.
//!
//! # Crate layout
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`types`] | Verbs, error codes, [`Header`], [`Record`], [`ProtocolRequest`], [`Envelope`] |
//! | [`validation`] | Argument checks and [`Datestamp`]/[`DateRange`] parsing |
//! | [`xml`] | Owned XML element tree used for payloads and responses |
//! | [`render`] | `<OAI-PMH>` document rendering via [`render_envelope`] |
//!
//! # Quick start
//!
//! ```rust,ignore
//! use oaipmh::{Envelope, OaiError, ProtocolRequest, ResponseBody, render_envelope};
//!
//! let env = Envelope::new(
//!     ProtocolRequest::bare("http://localhost:8000/"),
//!     ResponseBody::Error(OaiError::bad_verb(Some("Bogus"))),
//! );
//! let xml = render_envelope(&env).unwrap();
//! ```

pub mod render;
pub mod types;
pub mod validation;
pub mod xml;

pub use render::{render_application_error, render_envelope};
pub use types::{
    DeletedRecord, Envelope, ErrorCode, Granularity, Header, Identify, MetadataFormat, OaiError,
    ProtocolRequest, Record, ResponseBody, ResumptionToken, SetInfo, Verb, OAI_NAMESPACE,
    PROTOCOL_VERSION,
};
pub use validation::{DateRange, Datestamp, ValidationError};
pub use xml::{XmlElement, XmlError, XmlNode};
