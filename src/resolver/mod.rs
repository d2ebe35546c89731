//! Endpoint resolution.
//!
//! # Data Flow
//! ```text
//! Envelope (request)
//!     → KVP? query string / form body → REQUEST, SERVICE, LAYERS, TYPENAME(S), ...
//!     → XML? body → root element, @service, per-operation endpoint rules (xml.rs)
//!     → OgcMessage { service, operation, endpoint, endpoint_namespace, reflect }
//! ```
//!
//! # Design Decisions
//! - Resolution is a pure function of the buffered body and the URI
//! - A call without an endpoint concept resolves service-wide, not to an error
//! - Unknown service/operation is an error value the pipeline treats as pass-through

mod xml;

use axum::http::Method;
use thiserror::Error;

use crate::envelope::{Envelope, EnvelopeError};
use crate::message::{KvpParams, MessageError, XmlDocument};
use crate::ogc::{infer_service, OgcMessage, OperationType, ServiceType};

/// Parameters naming the targeted resource, in lookup order.
pub const ENDPOINT_PARAMS: &[&str] = &["LAYERS", "LAYER", "TYPENAME", "TYPENAMES", "NAMESPACE"];

/// Extra coverage parameters consulted for WCS.
pub const WCS_ENDPOINT_PARAMS: &[&str] = &["COVERAGEID", "COVERAGE", "IDENTIFIER"];

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Why a call could not be mapped onto (service, operation).
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Malformed body. The call is rejected.
    #[error("failed to parse request: {0}")]
    Parse(#[from] MessageError),

    #[error(transparent)]
    Body(#[from] EnvelopeError),

    #[error("unknown or missing service '{0}'")]
    UnknownService(String),

    #[error("operation '{operation}' is not part of service {service}")]
    UnknownOperation { service: String, operation: String },

    #[error("request names no operation")]
    MissingOperation,
}

impl ResolveError {
    /// Whether the call should be forwarded untouched instead of rejected.
    pub fn is_pass_through(&self) -> bool {
        matches!(
            self,
            ResolveError::UnknownService(_) | ResolveError::UnknownOperation { .. } | ResolveError::MissingOperation
        )
    }
}

/// Derives (service, operation, endpoint) from a request envelope.
pub async fn resolve(envelope: &mut Envelope) -> Result<OgcMessage, ResolveError> {
    let mut params = envelope.query_params();
    let is_form = envelope
        .content_type()
        .is_some_and(|ct| ct.to_ascii_lowercase().starts_with(FORM_CONTENT_TYPE));
    let has_body = envelope.method() != Some(&Method::GET) && envelope.method() != Some(&Method::HEAD);

    if is_form && has_body {
        let form = KvpParams::from_bytes(envelope.body().await?);
        params = params.iter().chain(form.iter()).map(|(k, v)| (k.to_string(), v.to_string())).collect();
        return resolve_kvp(&params);
    }
    if params.contains("REQUEST") || params.contains("useReflect") || !has_body {
        return resolve_kvp(&params);
    }

    let body = envelope.body().await?;
    if body.iter().all(u8::is_ascii_whitespace) {
        return resolve_kvp(&params);
    }
    let doc = XmlDocument::parse(body)?;
    resolve_xml(&doc)
}

fn service_for(raw: Option<&str>, operation: OperationType) -> Result<ServiceType, ResolveError> {
    let service = match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => raw
            .parse::<ServiceType>()
            .map_err(|_| ResolveError::UnknownService(raw.to_string()))?,
        None => infer_service(operation).ok_or_else(|| ResolveError::UnknownService(String::new()))?,
    };
    if !service.supports(operation) {
        return Err(ResolveError::UnknownOperation {
            service: service.to_string(),
            operation: operation.to_string(),
        });
    }
    Ok(service)
}

fn parse_operation(raw: &str, service: Option<&str>) -> Result<OperationType, ResolveError> {
    raw.parse::<OperationType>()
        .map_err(|_| ResolveError::UnknownOperation {
            service: service.unwrap_or_default().to_string(),
            operation: raw.to_string(),
        })
}

/// Resolves a key/value-pair call.
pub fn resolve_kvp(params: &KvpParams) -> Result<OgcMessage, ResolveError> {
    let use_reflect = params
        .get("useReflect")
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));
    let raw_operation = params.get("REQUEST").map(str::trim).filter(|s| !s.is_empty());

    // reflector calls may omit SERVICE/REQUEST; they are map requests
    if raw_operation.is_none() && use_reflect {
        if let Some(endpoint) = params.first_of(ENDPOINT_PARAMS) {
            let mut message = OgcMessage::new(ServiceType::Wms, OperationType::GetMap).with_endpoint(endpoint);
            message.reflect = true;
            return Ok(message);
        }
    }

    let raw_operation = raw_operation.ok_or(ResolveError::MissingOperation)?;
    let raw_service = params.get("SERVICE");
    let operation = parse_operation(raw_operation, raw_service)?;
    let service = service_for(raw_service, operation)?;

    let mut endpoint = params.first_of(ENDPOINT_PARAMS);
    if endpoint.is_none() && service == ServiceType::Wcs {
        endpoint = params.first_of(WCS_ENDPOINT_PARAMS);
    }

    let mut message = OgcMessage::new(service, operation);
    if let Some(endpoint) = endpoint {
        message = message.with_endpoint(endpoint);
    }
    message.reflect = service == ServiceType::Wms && use_reflect;
    Ok(message)
}

/// Resolves an XML-encoded call.
pub fn resolve_xml(doc: &XmlDocument) -> Result<OgcMessage, ResolveError> {
    let root = doc.root();
    let raw_service = root.attribute("service");
    let operation = parse_operation(root.local_name(), raw_service)?;
    let service = service_for(raw_service, operation)?;

    let mut message = OgcMessage::new(service, operation);
    if let Some(found) = xml::endpoint(doc, service, operation)? {
        message = message.with_endpoint(found.name);
        message.endpoint_namespace = found.namespace;
    }
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};

    fn get(query: &str) -> Envelope {
        let request = Request::builder()
            .uri(format!("/ows?{query}"))
            .body(Body::empty())
            .unwrap();
        Envelope::from_request(request, 1 << 20)
    }

    fn post(body: &'static str, content_type: &str) -> Envelope {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/ows")
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap();
        Envelope::from_request(request, 1 << 20)
    }

    #[tokio::test]
    async fn test_kvp_getmap() {
        let mut env = get("service=wms&request=getmap&layers=topp:states&useReflect=TRUE");
        let msg = resolve(&mut env).await.unwrap();
        assert_eq!(msg.service, ServiceType::Wms);
        assert_eq!(msg.operation, OperationType::GetMap);
        assert_eq!(msg.endpoint.as_deref(), Some("topp:states"));
        assert!(msg.reflect);
    }

    #[tokio::test]
    async fn test_kvp_capabilities_is_service_wide() {
        let mut env = get("SERVICE=WFS&REQUEST=GetCapabilities");
        let msg = resolve(&mut env).await.unwrap();
        assert_eq!(msg.endpoint, None);
    }

    #[tokio::test]
    async fn test_kvp_infers_service_and_wcs_params() {
        let mut env = get("REQUEST=DescribeFeatureType&TYPENAME=a:b");
        assert_eq!(resolve(&mut env).await.unwrap().service, ServiceType::Wfs);

        let mut env = get("SERVICE=WCS&REQUEST=GetCoverage&COVERAGEID=nurc__dem");
        assert_eq!(resolve(&mut env).await.unwrap().endpoint.as_deref(), Some("nurc__dem"));
    }

    #[tokio::test]
    async fn test_unknown_operation_is_pass_through() {
        let mut env = get("SERVICE=WMS&REQUEST=GetFeature");
        let err = resolve(&mut env).await.unwrap_err();
        assert!(matches!(err, ResolveError::UnknownOperation { .. }));
        assert!(err.is_pass_through());

        let mut env = get("SERVICE=WMTS&REQUEST=GetTile");
        assert!(resolve(&mut env).await.unwrap_err().is_pass_through());

        let mut env = get("foo=bar");
        assert!(matches!(resolve(&mut env).await, Err(ResolveError::MissingOperation)));
    }

    #[tokio::test]
    async fn test_reflector_defaults_to_get_map() {
        let mut env = get("layers=topp:states&useReflect=true&format=image/png");
        let msg = resolve(&mut env).await.unwrap();
        assert_eq!(msg.service, ServiceType::Wms);
        assert_eq!(msg.operation, OperationType::GetMap);
        assert!(msg.reflect);
    }

    #[tokio::test]
    async fn test_form_body_is_kvp() {
        let mut env = post(
            "SERVICE=WMS&REQUEST=GetFeatureInfo&QUERY_LAYERS=x&LAYERS=topp%3Aroads",
            "application/x-www-form-urlencoded; charset=UTF-8",
        );
        let msg = resolve(&mut env).await.unwrap();
        assert_eq!(msg.operation, OperationType::GetFeatureInfo);
        assert_eq!(msg.endpoint.as_deref(), Some("topp:roads"));
    }

    #[tokio::test]
    async fn test_xml_get_feature() {
        let mut env = post(
            r#"<wfs:GetFeature service="WFS" version="1.1.0" xmlns:wfs="http://www.opengis.net/wfs">
                 <wfs:Query typeName="TEST:MY_FEATURE_TYPE" xmlns:TEST="http://localhost/TEST"/>
               </wfs:GetFeature>"#,
            "text/xml",
        );
        let msg = resolve(&mut env).await.unwrap();
        assert_eq!(msg.service, ServiceType::Wfs);
        assert_eq!(msg.operation, OperationType::GetFeature);
        assert_eq!(msg.endpoint.as_deref(), Some("TEST:MY_FEATURE_TYPE"));
        assert_eq!(msg.endpoint_namespace.as_deref(), Some("http://localhost/TEST"));
    }

    #[tokio::test]
    async fn test_resolution_is_repeatable() {
        let mut env = post(
            r#"<Transaction service="WFS"><Insert><TEST:MY_FEATURE_TYPE xmlns:TEST="http://localhost/TEST"/></Insert></Transaction>"#,
            "application/xml",
        );
        let first = resolve(&mut env).await.unwrap();
        let second = resolve(&mut env).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.endpoint.as_deref(), Some("TEST:MY_FEATURE_TYPE"));
    }

    #[tokio::test]
    async fn test_malformed_body_is_parse_error() {
        let mut env = post("<GetFeature service=\"WFS\"><Query>", "text/xml");
        let err = resolve(&mut env).await.unwrap_err();
        assert!(matches!(err, ResolveError::Parse(_)));
        assert!(!err.is_pass_through());
    }
}
