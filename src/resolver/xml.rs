//! Endpoint extraction rules for XML-encoded operations.

use crate::message::path::{PathExpr, PathValue};
use crate::message::{MessageResult, XmlDocument, XmlElement};
use crate::ogc::{OperationType, ServiceType};

const QUERY_TYPE_NAMES: &str = "//Query/@typeName | //Query/@typeNames | //Lock/@typeName | //Lock/@typeNames";
const DESCRIBE_TYPE_NAMES: &str = "//TypeName/text() | //TypeNames/text()";
const COVERAGE_IDS: &str = "//Identifier/text() | //CoverageId/text() | //sourceCoverage/text()";
const SLD_LAYER_NAMES: &str = "//NamedLayer/Name/text()";
const FALLBACK_TEXT: &str = "//TypeName/text() | //TypeNames/text() | //GetCoverage/Identifier/text()";
const FALLBACK_ATTRIBUTES: &str = "//@typeName | //@typeNames";

const TRANSACTION_ACTIONS: &[&str] = &["Insert", "Update", "Delete", "Replace"];

/// Endpoint found in a document, with the namespace bound to its prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct FoundEndpoint {
    pub name: String,
    pub namespace: Option<String>,
}

fn prefix_of(name: &str) -> Option<&str> {
    name.split_once(':').map(|(prefix, _)| prefix)
}

fn namespace_for(doc: &XmlDocument, element: &XmlElement, name: &str) -> Option<String> {
    let prefix = prefix_of(name)?;
    doc.namespace_scope(element)?
        .resolve(Some(prefix))
        .map(str::to_string)
}

/// First non-blank hit of `expr`, with its namespace.
fn first_hit(doc: &XmlDocument, expr: &str) -> MessageResult<Option<FoundEndpoint>> {
    let hits = PathExpr::parse(expr)?.select(doc);
    Ok(hits.iter().find_map(|hit: &PathValue<'_>| {
        let name = hit.string_value().trim().to_string();
        if name.is_empty() {
            return None;
        }
        let namespace = namespace_for(doc, hit.element(), &name);
        Some(FoundEndpoint { name, namespace })
    }))
}

/// Endpoint of a WFS transaction: the first action decides.
/// Inserts carry the feature type as the tag of their child element.
fn transaction_endpoint(doc: &XmlDocument) -> Option<FoundEndpoint> {
    let action = doc
        .root()
        .elements()
        .find(|e| TRANSACTION_ACTIONS.contains(&e.local_name()))?;

    match action.local_name() {
        "Insert" | "Replace" => {
            let feature = action.elements().next()?;
            let namespace = doc
                .namespace_scope(feature)
                .and_then(|scope| scope.resolve(feature.prefix()).map(str::to_string));
            Some(FoundEndpoint {
                name: feature.name.clone(),
                namespace,
            })
        }
        _ => {
            let name = action
                .attribute("typeName")
                .or_else(|| action.attribute("typeNames"))?
                .trim()
                .to_string();
            if name.is_empty() {
                return None;
            }
            let namespace = namespace_for(doc, action, &name);
            Some(FoundEndpoint { name, namespace })
        }
    }
}

pub(super) fn endpoint(
    doc: &XmlDocument,
    service: ServiceType,
    operation: OperationType,
) -> MessageResult<Option<FoundEndpoint>> {
    let specific = match operation {
        OperationType::GetCapabilities => return Ok(None),
        OperationType::GetFeature | OperationType::LockFeature => first_hit(doc, QUERY_TYPE_NAMES)?,
        OperationType::Transaction => transaction_endpoint(doc),
        OperationType::DescribeFeatureType => first_hit(doc, DESCRIBE_TYPE_NAMES)?,
        OperationType::DescribeCoverage | OperationType::GetCoverage => first_hit(doc, COVERAGE_IDS)?,
        OperationType::GetMap if service == ServiceType::Wms => first_hit(doc, SLD_LAYER_NAMES)?,
        _ => None,
    };
    if specific.is_some() {
        return Ok(specific);
    }

    match first_hit(doc, FALLBACK_TEXT)? {
        Some(found) => Ok(Some(found)),
        None => first_hit(doc, FALLBACK_ATTRIBUTES),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(xml: &str, service: ServiceType, operation: OperationType) -> Option<FoundEndpoint> {
        let doc = XmlDocument::parse_str(xml).unwrap();
        endpoint(&doc, service, operation).unwrap()
    }

    #[test]
    fn test_update_uses_type_name_attribute() {
        let found = resolve(
            r#"<wfs:Transaction xmlns:wfs="http://www.opengis.net/wfs" service="WFS">
                 <wfs:Update typeName="TEST:MY_FEATURE_TYPE" xmlns:TEST="http://localhost/TEST">
                   <wfs:Property><wfs:Name>name</wfs:Name><wfs:Value>x</wfs:Value></wfs:Property>
                 </wfs:Update>
               </wfs:Transaction>"#,
            ServiceType::Wfs,
            OperationType::Transaction,
        )
        .unwrap();
        assert_eq!(found.name, "TEST:MY_FEATURE_TYPE");
        assert_eq!(found.namespace.as_deref(), Some("http://localhost/TEST"));
    }

    #[test]
    fn test_insert_uses_child_tag() {
        let found = resolve(
            r#"<wfs:Transaction xmlns:wfs="http://www.opengis.net/wfs" service="WFS">
                 <wfs:Insert>
                   <TEST:MY_FEATURE_TYPE xmlns:TEST="http://localhost/TEST"><TEST:name>n</TEST:name></TEST:MY_FEATURE_TYPE>
                 </wfs:Insert>
               </wfs:Transaction>"#,
            ServiceType::Wfs,
            OperationType::Transaction,
        )
        .unwrap();
        assert_eq!(found.name, "TEST:MY_FEATURE_TYPE");
        assert_eq!(found.namespace.as_deref(), Some("http://localhost/TEST"));
    }

    #[test]
    fn test_same_prefix_differs_per_document() {
        let a = resolve(
            r#"<GetFeature xmlns:ns="urn:a"><Query typeName="ns:t"/></GetFeature>"#,
            ServiceType::Wfs,
            OperationType::GetFeature,
        )
        .unwrap();
        let b = resolve(
            r#"<GetFeature xmlns:ns="urn:b"><Query typeName="ns:t"/></GetFeature>"#,
            ServiceType::Wfs,
            OperationType::GetFeature,
        )
        .unwrap();
        assert_eq!(a.namespace.as_deref(), Some("urn:a"));
        assert_eq!(b.namespace.as_deref(), Some("urn:b"));
    }

    #[test]
    fn test_describe_and_coverage_text() {
        let found = resolve(
            "<DescribeFeatureType><TypeName>topp:states</TypeName></DescribeFeatureType>",
            ServiceType::Wfs,
            OperationType::DescribeFeatureType,
        )
        .unwrap();
        assert_eq!(found.name, "topp:states");
        // unbound prefix is not an error
        assert_eq!(found.namespace, None);

        let found = resolve(
            "<GetCoverage><ows:Identifier xmlns:ows=\"urn:ows\">nurc:dem</ows:Identifier></GetCoverage>",
            ServiceType::Wcs,
            OperationType::GetCoverage,
        )
        .unwrap();
        assert_eq!(found.name, "nurc:dem");
    }

    #[test]
    fn test_sld_get_map_and_capabilities() {
        let found = resolve(
            "<GetMap><StyledLayerDescriptor><NamedLayer><Name>topp:roads</Name></NamedLayer></StyledLayerDescriptor></GetMap>",
            ServiceType::Wms,
            OperationType::GetMap,
        )
        .unwrap();
        assert_eq!(found.name, "topp:roads");

        assert!(resolve(
            "<GetCapabilities service=\"WFS\"/>",
            ServiceType::Wfs,
            OperationType::GetCapabilities
        )
        .is_none());
    }
}
