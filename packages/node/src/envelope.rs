//! Request normalization and response envelopes.
//!
//! Query parameters are mapped onto [`ProtocolRequest`] fields through a
//! static table of wire names. Parameters missing from the table are not
//! OAI-PMH arguments; they are dropped and never echoed.

use oaipmh::{Envelope, ErrorCode, OaiError, ProtocolRequest, ResponseBody, Verb};

/// `metadataPrefix` used when the request does not name one.
pub const DEFAULT_METADATA_PREFIX: &str = "oai_dc";

/// A recognized OAI-PMH argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Argument {
    Verb,
    Identifier,
    MetadataPrefix,
    From,
    Until,
    Set,
    ResumptionToken,
}

/// Wire name → argument.
const ARGUMENTS: [(&str, Argument); 7] = [
    ("verb", Argument::Verb),
    ("identifier", Argument::Identifier),
    ("metadataPrefix", Argument::MetadataPrefix),
    ("from", Argument::From),
    ("until", Argument::Until),
    ("set", Argument::Set),
    ("resumptionToken", Argument::ResumptionToken),
];

impl Argument {
    pub fn from_wire(name: &str) -> Option<Self> {
        ARGUMENTS
            .iter()
            .find(|(wire, _)| *wire == name)
            .map(|(_, arg)| *arg)
    }

    pub fn wire_name(self) -> &'static str {
        ARGUMENTS
            .iter()
            .find(|(_, arg)| *arg == self)
            .map(|(wire, _)| *wire)
            .unwrap_or("unknown")
    }
}

/// Build the protocol request from raw query pairs.
///
/// Fails with `badVerb` when the verb is missing, unknown or repeated, and
/// with `badArgument` when any other argument is repeated.
pub fn parse_request(
    base_url: &str,
    pairs: &[(String, String)],
) -> Result<ProtocolRequest, OaiError> {
    let mut request = ProtocolRequest::bare(base_url);
    let mut verb: Option<&str> = None;

    for (name, value) in pairs {
        let Some(argument) = Argument::from_wire(name) else {
            continue;
        };
        let slot = match argument {
            Argument::Verb => {
                if verb.is_some() {
                    return Err(OaiError::new(
                        ErrorCode::BadVerb,
                        "the verb argument must not be repeated",
                    ));
                }
                verb = Some(value.as_str());
                continue;
            }
            Argument::Identifier => &mut request.identifier,
            Argument::MetadataPrefix => &mut request.metadata_prefix,
            Argument::From => &mut request.from,
            Argument::Until => &mut request.until,
            Argument::Set => &mut request.set,
            Argument::ResumptionToken => &mut request.resumption_token,
        };
        if slot.is_some() {
            return Err(OaiError::bad_argument(format!(
                "the {} argument must not be repeated",
                argument.wire_name()
            )));
        }
        *slot = Some(value.clone());
    }

    let verb = verb.ok_or_else(|| OaiError::bad_verb(None))?;
    request.verb = Some(
        verb.parse::<Verb>()
            .map_err(|_| OaiError::bad_verb(Some(verb)))?,
    );
    Ok(request)
}

/// Wrap a response body, echoing the request.
///
/// `badVerb` and `badArgument` responses echo the base URL only, because
/// the arguments that caused them are not trustworthy.
pub fn envelope(request: &ProtocolRequest, body: ResponseBody) -> Envelope {
    let echo = match body.error().map(|e| e.code) {
        Some(ErrorCode::BadVerb | ErrorCode::BadArgument) => request.without_arguments(),
        _ => request.clone(),
    };
    Envelope::new(echo, body)
}
