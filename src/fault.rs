//! Normalized faults for failed service calls.
//!
//! Whatever went wrong underneath (gateway rejection, SOAP fault, timeout,
//! broken connection) is translated into a single [`Fault`] carrying a `qc:`
//! code, an optional subcode and whatever explanation the remote side sent.
//! Translation never fails: an unreadable error body degrades to an internal
//! error fault.

use crate::parser;
use std::fmt;
use std::io::Read;
use tracing::{debug, warn};

/// Namespace of the bank's own service fault codes.
pub const SERVICES_NS: &str = "http://www.quantiguous.com/services";

pub const CODE_UNAUTHORIZED: &str = "qc:E401";
pub const CODE_INTERNAL_ERROR: &str = "qc:E500";
pub const CODE_BAD_GATEWAY: &str = "qc:E502";
pub const CODE_SERVICE_UNAVAILABLE: &str = "qc:E503";
pub const CODE_GATEWAY_TIMEOUT: &str = "qc:E504";

/// Subcode for user/password rejected by the gateway's LDAP login page.
pub const SUBCODE_LDAP_LOGIN: &str = "qc:ldap401";

/// Gateway `moreInformation` texts and the subcodes they map to.
const GATEWAY_SUBCODES: &[(&str, &str)] = &[
    ("Invalid client id or secret.", "qc:dp100"),
    ("Client id not registered.", "qc:dp101"),
    ("Not Registered to Plan", "qc:dp102"),
    ("Authentication Failure, Unable to Validate Credentials", "qc:dp103"),
    ("Rate Limit - Rate Limit Exceeded", "qc:dp104"),
    ("Client id missing.", "qc:dp107"),
];

const INTERNAL_SERVER_ERROR_PREFIX: &str = "Internal Server Error";
const INTERNAL_SERVER_ERROR_SUBCODE: &str = "qc:dp105";

/// Map a gateway `moreInformation` text to its subcode.
pub fn gateway_subcode(more_information: &str) -> Option<&'static str> {
    GATEWAY_SUBCODES
        .iter()
        .find(|(text, _)| *text == more_information)
        .map(|(_, code)| *code)
        .or_else(|| {
            more_information
                .starts_with(INTERNAL_SERVER_ERROR_PREFIX)
                .then_some(INTERNAL_SERVER_ERROR_SUBCODE)
        })
}

/// A namespace-qualified SOAP fault code, possibly with a nested subcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultCode {
    pub namespace: String,
    pub name: String,
    pub sub_code: Option<Box<FaultCode>>,
}

impl FaultCode {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            sub_code: None,
        }
    }

    pub fn with_sub_code(mut self, sub_code: FaultCode) -> Self {
        self.sub_code = Some(Box::new(sub_code));
        self
    }

    /// `ns:<name>` for the bank's own namespace, `<namespace>:<name>` otherwise.
    pub fn format(&self) -> String {
        match self.namespace.as_str() {
            SERVICES_NS => format!("ns:{}", self.name),
            namespace => format!("{}:{}", namespace, self.name),
        }
    }
}

/// A structured fault returned by a SOAP service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapFault {
    pub code: FaultCode,
    pub reason: String,
    pub detail: Option<FaultDetail>,
}

/// Content of a SOAP fault `Detail` element.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FaultDetail {
    /// Raw XML between the `Detail` tags
    pub content: String,
    /// `xmlns` declarations in scope at the `Detail` element, as (prefix, URI)
    pub namespaces: Vec<(String, String)>,
}

impl FaultDetail {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            namespaces: Vec::new(),
        }
    }

    pub fn with_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.namespaces.push((prefix.into(), uri.into()));
        self
    }

    /// What a caller should see of this detail: the `messageInserts` element
    /// if there is one, else the first child element, else the raw content.
    pub fn message_inserts(&self) -> String {
        parser::message_inserts(self)
            .or_else(|| parser::first_element(self))
            .unwrap_or_else(|| self.content.trim().to_string())
    }
}

/// Error response body as handed over by the HTTP stack.
pub struct ErrorResponse {
    content_type: String,
    body: Box<dyn Read + Send>,
}

impl ErrorResponse {
    pub fn new(content_type: impl Into<String>, body: impl Read + Send + 'static) -> Self {
        Self {
            content_type: content_type.into(),
            body: Box::new(body),
        }
    }

    pub fn from_bytes(content_type: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self::new(content_type, std::io::Cursor::new(body.into()))
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Media type without parameters, lowercased.
    fn media_type(&self) -> String {
        self.content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase()
    }

    fn read_body(mut self) -> std::io::Result<String> {
        let mut bytes = Vec::new();
        self.body.read_to_end(&mut bytes)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl fmt::Debug for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorResponse")
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// A failed service call, as seen by the caller before translation.
#[derive(Debug)]
pub enum TransportError {
    /// The gateway rejected the caller's credentials
    Unauthorized {
        message: String,
        response: ErrorResponse,
    },
    /// The service answered with a SOAP fault
    Remote(SoapFault),
    /// No reply in time
    Timeout(String),
    /// Connection or transport failure
    Communication(String),
    /// Anything else
    Other(String),
}

/// Category of a [`Fault`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Unauthorized,
    RemoteFault,
    Timeout,
    ServiceUnavailable,
    InternalError,
}

/// Normalized representation of a failed service call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    kind: FaultKind,
    code: String,
    sub_code: Option<String>,
    reason: String,
    message_inserts: Option<String>,
    response_text: Option<String>,
}

impl Fault {
    /// Translate a failed call into a fault.
    pub fn translate(error: TransportError) -> Self {
        let fault = match error {
            TransportError::Unauthorized { message, response } => {
                Self::from_unauthorized(message, response)
            }
            TransportError::Remote(soap_fault) => Self::from_soap_fault(soap_fault),
            TransportError::Timeout(message) => {
                Self::simple(FaultKind::Timeout, CODE_GATEWAY_TIMEOUT, message)
            }
            TransportError::Communication(message) => Self::simple(
                FaultKind::ServiceUnavailable,
                CODE_SERVICE_UNAVAILABLE,
                message,
            ),
            TransportError::Other(message) => {
                Self::simple(FaultKind::InternalError, CODE_INTERNAL_ERROR, message)
            }
        };

        debug!(
            code = %fault.code,
            sub_code = ?fault.sub_code,
            kind = ?fault.kind,
            "Translated service failure"
        );

        fault
    }

    fn simple(kind: FaultKind, code: &str, reason: String) -> Self {
        Self {
            kind,
            code: code.to_string(),
            sub_code: None,
            reason,
            message_inserts: None,
            response_text: None,
        }
    }

    fn from_unauthorized(message: String, response: ErrorResponse) -> Self {
        let mut fault = Self::simple(FaultKind::Unauthorized, CODE_UNAUTHORIZED, message);
        let media_type = response.media_type();

        if media_type.starts_with("text/html") {
            // LDAP login page: user/password did not authenticate
            fault.sub_code = Some(SUBCODE_LDAP_LOGIN.to_string());
            return fault;
        }

        let body = match response.read_body() {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Failed to read unauthorized response body");
                return Self::simple(FaultKind::InternalError, CODE_INTERNAL_ERROR, fault.reason);
            }
        };

        if media_type == "application/xml" || media_type == "text/xml" {
            let more_information = match parser::more_information(&body) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "Failed to parse unauthorized response body");
                    return Self::simple(
                        FaultKind::InternalError,
                        CODE_INTERNAL_ERROR,
                        fault.reason,
                    );
                }
            };
            fault.sub_code = more_information
                .as_deref()
                .and_then(gateway_subcode)
                .map(str::to_string);
            fault.message_inserts = more_information;
            fault.response_text = Some(body);
        } else {
            fault.message_inserts = Some(body);
        }

        fault
    }

    fn from_soap_fault(soap_fault: SoapFault) -> Self {
        let SoapFault {
            code: top,
            reason,
            detail,
        } = soap_fault;

        let mut fault = Self::simple(FaultKind::RemoteFault, CODE_BAD_GATEWAY, reason);

        if let Some(sub) = top.sub_code.as_deref() {
            fault.code = sub.format();
            fault.sub_code = sub.sub_code.as_deref().map(FaultCode::format);
        }

        if let Some(detail) = detail {
            fault.message_inserts = Some(detail.message_inserts());
        }

        fault
    }

    pub fn kind(&self) -> FaultKind {
        self.kind
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn sub_code(&self) -> Option<&str> {
        self.sub_code.as_deref()
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn message_inserts(&self) -> Option<&str> {
        self.message_inserts.as_deref()
    }

    /// Full XML body of a gateway rejection, when one was received.
    pub fn response_text(&self) -> Option<&str> {
        self.response_text.as_deref()
    }
}

impl From<TransportError> for Fault {
    fn from(error: TransportError) -> Self {
        Self::translate(error)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Fault: Code {} SubCode: {} ReasonText: {} messageInserts: {}",
            self.code,
            self.sub_code.as_deref().unwrap_or(""),
            self.reason,
            self.message_inserts.as_deref().unwrap_or("")
        )
    }
}

impl std::error::Error for Fault {}

#[cfg(test)]
mod tests {
    use super::*;

    fn unauthorized(content_type: &str, body: &str) -> Fault {
        Fault::translate(TransportError::Unauthorized {
            message: "The HTTP request was forbidden".to_string(),
            response: ErrorResponse::from_bytes(content_type, body),
        })
    }

    fn gateway_error(more_information: &str) -> String {
        format!(
            "<errorResponse><httpCode>401</httpCode><moreInformation>{}</moreInformation></errorResponse>",
            more_information
        )
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"))
        }
    }

    #[test]
    fn test_gateway_subcodes() {
        let cases = [
            ("Invalid client id or secret.", "qc:dp100"),
            ("Client id not registered.", "qc:dp101"),
            ("Not Registered to Plan", "qc:dp102"),
            ("Authentication Failure, Unable to Validate Credentials", "qc:dp103"),
            ("Rate Limit - Rate Limit Exceeded", "qc:dp104"),
            ("Internal Server Error", "qc:dp105"),
            ("Internal Server Error: backend down", "qc:dp105"),
            ("Client id missing.", "qc:dp107"),
        ];
        for (text, expected) in cases {
            let fault = unauthorized("application/xml", &gateway_error(text));
            assert_eq!(fault.code(), CODE_UNAUTHORIZED);
            assert_eq!(fault.sub_code(), Some(expected), "{text}");
            assert_eq!(fault.message_inserts(), Some(text));
            assert_eq!(fault.kind(), FaultKind::Unauthorized);
        }
    }

    #[test]
    fn test_unknown_gateway_text_has_no_subcode() {
        let body = gateway_error("Something else entirely");
        let fault = unauthorized("application/xml", &body);
        assert_eq!(fault.code(), CODE_UNAUTHORIZED);
        assert!(fault.sub_code().is_none());
        assert_eq!(fault.message_inserts(), Some("Something else entirely"));
        assert_eq!(fault.response_text(), Some(body.as_str()));
    }

    #[test]
    fn test_gateway_subcode_is_exact_match() {
        assert_eq!(gateway_subcode("client id missing."), None);
        assert_eq!(gateway_subcode("Client id missing. "), None);
    }

    #[test]
    fn test_xml_content_type_with_charset() {
        let fault = unauthorized(
            "application/xml; charset=UTF-8",
            &gateway_error("Client id missing."),
        );
        assert_eq!(fault.sub_code(), Some("qc:dp107"));
    }

    #[test]
    fn test_html_response_is_ldap_failure() {
        let fault = unauthorized("text/html; charset=iso-8859-1", "<html>Login</html>");
        assert_eq!(fault.code(), CODE_UNAUTHORIZED);
        assert_eq!(fault.sub_code(), Some(SUBCODE_LDAP_LOGIN));
        assert!(fault.message_inserts().is_none());
        assert!(fault.response_text().is_none());
    }

    #[test]
    fn test_other_content_type_keeps_body_verbatim() {
        let fault = unauthorized("text/plain", "  access denied\n");
        assert_eq!(fault.code(), CODE_UNAUTHORIZED);
        assert!(fault.sub_code().is_none());
        assert_eq!(fault.message_inserts(), Some("  access denied\n"));
    }

    #[test]
    fn test_malformed_xml_falls_back_to_internal_error() {
        let fault = unauthorized("application/xml", "<errorResponse><moreInformation>x</errorResponse>");
        assert_eq!(fault.code(), CODE_INTERNAL_ERROR);
        assert_eq!(fault.kind(), FaultKind::InternalError);
        assert!(fault.sub_code().is_none());
        assert_eq!(fault.reason(), "The HTTP request was forbidden");
    }

    #[test]
    fn test_unreadable_body_falls_back_to_internal_error() {
        let fault = Fault::translate(TransportError::Unauthorized {
            message: "denied".to_string(),
            response: ErrorResponse::new("text/plain", FailingReader),
        });
        assert_eq!(fault.code(), CODE_INTERNAL_ERROR);
        assert!(fault.message_inserts().is_none());
    }

    #[test]
    fn test_soap_fault_with_nested_subcodes() {
        let soap_fault = SoapFault {
            code: FaultCode::new(crate::parser::SOAP_12_NS, "Receiver").with_sub_code(
                FaultCode::new(SERVICES_NS, "E404")
                    .with_sub_code(FaultCode::new("urn:partner", "P17")),
            ),
            reason: "Beneficiary not found".to_string(),
            detail: Some(
                FaultDetail::new(
                    "<ns:fault><ns:code>12</ns:code><ns:messageInserts>acct 12</ns:messageInserts></ns:fault>",
                )
                .with_namespace("ns", SERVICES_NS),
            ),
        };
        let fault = Fault::translate(TransportError::Remote(soap_fault));
        assert_eq!(fault.kind(), FaultKind::RemoteFault);
        assert_eq!(fault.code(), "ns:E404");
        assert_eq!(fault.sub_code(), Some("urn:partner:P17"));
        assert_eq!(fault.reason(), "Beneficiary not found");
        assert_eq!(
            fault.message_inserts(),
            Some(r#"<ns:messageInserts xmlns:ns="http://www.quantiguous.com/services">acct 12</ns:messageInserts>"#)
        );
    }

    #[test]
    fn test_soap_fault_without_subcode_is_bad_gateway() {
        let soap_fault = SoapFault {
            code: FaultCode::new(crate::parser::SOAP_11_NS, "Server"),
            reason: "boom".to_string(),
            detail: Some(FaultDetail::new("<trace>stack</trace><host>gw-2</host>")),
        };
        let fault = Fault::translate(TransportError::Remote(soap_fault));
        assert_eq!(fault.code(), CODE_BAD_GATEWAY);
        assert!(fault.sub_code().is_none());
        assert_eq!(fault.message_inserts(), Some("<trace>stack</trace>"));
    }

    #[test]
    fn test_detail_without_message_inserts_uses_first_child() {
        let detail = FaultDetail::new("\n  <a>1</a>\n  <b>2</b>\n");
        assert_eq!(detail.message_inserts(), "<a>1</a>");
    }

    #[test]
    fn test_text_only_detail_is_kept_raw() {
        let detail = FaultDetail::new("  backend unavailable  ");
        assert_eq!(detail.message_inserts(), "backend unavailable");
    }

    #[test]
    fn test_padded_gateway_text_is_not_matched() {
        let body = "<errorResponse><moreInformation>  Client id missing.\n</moreInformation></errorResponse>";
        let fault = unauthorized("application/xml", body);
        assert_eq!(fault.code(), CODE_UNAUTHORIZED);
        assert!(fault.sub_code().is_none());
        assert_eq!(fault.message_inserts(), Some("  Client id missing.\n"));
    }

    #[test]
    fn test_generic_failures() {
        let timeout = Fault::from(TransportError::Timeout("no reply".to_string()));
        assert_eq!(timeout.code(), "qc:E504");
        assert_eq!(timeout.kind(), FaultKind::Timeout);

        let comm = Fault::from(TransportError::Communication("refused".to_string()));
        assert_eq!(comm.code(), "qc:E503");
        assert_eq!(comm.kind(), FaultKind::ServiceUnavailable);

        let other = Fault::from(TransportError::Other("bug".to_string()));
        assert_eq!(other.code(), "qc:E500");

        for fault in [timeout, comm, other] {
            assert!(fault.sub_code().is_none());
            assert!(fault.message_inserts().is_none());
        }
    }

    #[test]
    fn test_display_contains_all_fields() {
        let fault = Fault::from(TransportError::Timeout("no reply".to_string()));
        assert_eq!(
            fault.to_string(),
            "Fault: Code qc:E504 SubCode:  ReasonText: no reply messageInserts: "
        );

        let fault = unauthorized("application/xml", &gateway_error("Client id missing."));
        assert_eq!(
            fault.to_string(),
            "Fault: Code qc:E401 SubCode: qc:dp107 ReasonText: The HTTP request was forbidden messageInserts: Client id missing."
        );
    }

    #[test]
    fn test_format_fault_code() {
        assert_eq!(FaultCode::new(SERVICES_NS, "E404").format(), "ns:E404");
        assert_eq!(
            FaultCode::new("http://example.org/faults", "X1").format(),
            "http://example.org/faults:X1"
        );
    }
}
