//! Built-in renderer for the document-style operations.
//!
//! Raster output (GetMap, GetPrint, GetLegendGraphic) needs a rendering
//! engine, which plugs in through [`Renderer`]; this one reports those
//! operations as provider errors.

use quick_xml::escape::escape;
use serde_json::Value;

use crate::backend::{BackendError, FeatureSet, RenderRequest, Rendered, Renderer};
use crate::dispatcher::{OgcService, Operation};

const XML_CONTENT_TYPE: &str = "text/xml; charset=utf-8";
const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n";

#[derive(Debug, Default)]
pub struct DocumentRenderer;

impl Renderer for DocumentRenderer {
    fn render(&self, request: &RenderRequest<'_>) -> Result<Rendered, BackendError> {
        let service = OgcService::from_name(request.request.service());
        let body = match (service, request.operation) {
            (Some(OgcService::Wms), Operation::GetCapabilities | Operation::GetProjectSettings) => {
                wms_capabilities(request)
            }
            (Some(OgcService::Wfs), Operation::GetCapabilities) => wfs_capabilities(request),
            (_, Operation::DescribeFeatureType) => describe_feature_type(&request.feature_sets),
            (_, Operation::GetFeature) => feature_collection(&request.feature_sets),
            (_, Operation::GetFeatureInfo) => feature_info(&request.feature_sets),
            (_, operation) => {
                return Err(BackendError::Provider(format!(
                    "No rendering engine is configured for {}",
                    operation.name()
                )));
            }
        };
        Ok(Rendered::new(body, XML_CONTENT_TYPE))
    }
}

fn wms_capabilities(request: &RenderRequest<'_>) -> String {
    let root = match request.operation {
        Operation::GetProjectSettings => "GetProjectSettings",
        _ => "WMS_Capabilities",
    };
    let project = request.project;

    let mut xml = String::from(XML_DECLARATION);
    xml.push_str(&format!(
        "<{} version=\"{}\" xmlns=\"http://www.opengis.net/wms\">\n",
        root, request.version
    ));
    xml.push_str(&format!(
        " <Service>\n  <Name>WMS</Name>\n  <Title>{}</Title>\n </Service>\n",
        escape(project.title.as_str())
    ));
    xml.push_str(" <Capability>\n  <Request>\n");
    for operation in OgcService::Wms.operations() {
        xml.push_str(&format!("   <{}/>\n", operation.name()));
    }
    xml.push_str("  </Request>\n  <Layer>\n");
    for layer in &project.layers {
        xml.push_str(&format!(
            "   <Layer queryable=\"1\">\n    <Name>{}</Name>\n    <Title>{}</Title>\n    <CRS>{}</CRS>\n   </Layer>\n",
            escape(layer.name.as_str()),
            escape(layer.title.as_str()),
            escape(layer.crs.as_str()),
        ));
    }
    xml.push_str(&format!("  </Layer>\n </Capability>\n</{}>\n", root));
    xml
}

fn wfs_capabilities(request: &RenderRequest<'_>) -> String {
    let project = request.project;

    let mut xml = String::from(XML_DECLARATION);
    xml.push_str(&format!(
        "<WFS_Capabilities version=\"{}\" xmlns=\"http://www.opengis.net/wfs\">\n",
        request.version
    ));
    xml.push_str(&format!(
        " <Service>\n  <Name>WFS</Name>\n  <Title>{}</Title>\n </Service>\n",
        escape(project.title.as_str())
    ));
    xml.push_str(" <Capability>\n  <Request>\n");
    for operation in OgcService::Wfs.operations() {
        xml.push_str(&format!("   <{}/>\n", operation.name()));
    }
    xml.push_str("  </Request>\n </Capability>\n <FeatureTypeList>\n");
    for layer in &project.layers {
        xml.push_str(&format!(
            "  <FeatureType>\n   <Name>{}</Name>\n   <Title>{}</Title>\n   <SRS>{}</SRS>\n  </FeatureType>\n",
            escape(layer.name.as_str()),
            escape(layer.title.as_str()),
            escape(layer.crs.as_str()),
        ));
    }
    xml.push_str(" </FeatureTypeList>\n</WFS_Capabilities>\n");
    xml
}

fn describe_feature_type(sets: &[FeatureSet<'_>]) -> String {
    let mut xml = String::from(XML_DECLARATION);
    xml.push_str("<schema xmlns=\"http://www.w3.org/2001/XMLSchema\" xmlns:gml=\"http://www.opengis.net/gml\" elementFormDefault=\"qualified\">\n");
    for set in sets {
        let name = escape(set.layer.name.as_str());
        xml.push_str(&format!(
            " <element name=\"{}\" type=\"qgs:{}Type\" substitutionGroup=\"gml:_Feature\"/>\n",
            name, name
        ));
        xml.push_str(&format!(
            " <complexType name=\"{}Type\">\n  <complexContent>\n   <extension base=\"gml:AbstractFeatureType\">\n    <sequence>\n",
            name
        ));
        xml.push_str("     <element minOccurs=\"0\" maxOccurs=\"1\" type=\"gml:GeometryPropertyType\" name=\"geometry\"/>\n");
        let sample = set.layer.features.first();
        for (attribute, value) in sample.into_iter().flat_map(|f| f.attributes.iter()) {
            xml.push_str(&format!(
                "     <element type=\"{}\" name=\"{}\"/>\n",
                schema_type(value),
                escape(attribute.as_str())
            ));
        }
        xml.push_str("    </sequence>\n   </extension>\n  </complexContent>\n </complexType>\n");
    }
    xml.push_str("</schema>\n");
    xml
}

fn schema_type(value: &Value) -> &'static str {
    match value {
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "long",
        Value::Number(_) => "double",
        _ => "string",
    }
}

fn feature_collection(sets: &[FeatureSet<'_>]) -> String {
    let mut xml = String::from(XML_DECLARATION);
    xml.push_str("<wfs:FeatureCollection xmlns:wfs=\"http://www.opengis.net/wfs\" xmlns:gml=\"http://www.opengis.net/gml\" xmlns:qgs=\"http://www.qgis.org/gml\">\n");
    for set in sets {
        let layer = escape(set.layer.name.as_str());
        for feature in &set.features {
            xml.push_str(&format!(
                " <gml:featureMember>\n  <qgs:{} fid=\"{}.{}\">\n",
                layer, layer, feature.id
            ));
            if let Some(bbox) = &feature.bbox {
                xml.push_str(&format!(
                    "   <gml:boundedBy>\n    <gml:Box srsName=\"{}\">\n     <gml:coordinates cs=\",\" ts=\" \">{},{} {},{}</gml:coordinates>\n    </gml:Box>\n   </gml:boundedBy>\n",
                    escape(set.layer.crs.as_str()),
                    bbox.min_x,
                    bbox.min_y,
                    bbox.max_x,
                    bbox.max_y
                ));
            }
            for (attribute, value) in &feature.attributes {
                let name = escape(attribute.as_str());
                xml.push_str(&format!(
                    "   <qgs:{}>{}</qgs:{}>\n",
                    name,
                    escape(value_text(value).as_str()),
                    name
                ));
            }
            xml.push_str(&format!("  </qgs:{}>\n </gml:featureMember>\n", layer));
        }
    }
    xml.push_str("</wfs:FeatureCollection>\n");
    xml
}

fn feature_info(sets: &[FeatureSet<'_>]) -> String {
    let mut xml = String::from("<GetFeatureInfoResponse>\n");
    for set in sets {
        xml.push_str(&format!(
            " <Layer name=\"{}\">\n",
            escape(set.layer.name.as_str())
        ));
        for feature in &set.features {
            xml.push_str(&format!("  <Feature id=\"{}\">\n", feature.id));
            for (attribute, value) in &feature.attributes {
                xml.push_str(&format!(
                    "   <Attribute name=\"{}\" value=\"{}\"/>\n",
                    escape(attribute.as_str()),
                    escape(value_text(value).as_str())
                ));
            }
            xml.push_str("  </Feature>\n");
        }
        xml.push_str(" </Layer>\n");
    }
    xml.push_str("</GetFeatureInfoResponse>\n");
    xml
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::backend::{Feature, Layer, Project};
    use crate::geometry::Bbox;
    use crate::http::Method;
    use crate::request::{Request, RequestInput};
    use crate::settings::Settings;

    fn project() -> Project {
        let mut attributes = BTreeMap::new();
        attributes.insert("name".to_string(), Value::from("a<b"));
        attributes.insert("id".to_string(), Value::from(1));
        Project {
            title: "Test & Co".to_string(),
            layers: vec![Layer {
                name: "testlayer".to_string(),
                title: "Test layer".to_string(),
                crs: "EPSG:4326".to_string(),
                features: vec![Feature {
                    id: 1,
                    bbox: Some(Bbox::new(8.5, 44.5, 8.5, 44.5)),
                    attributes,
                }],
            }],
            ..Project::default()
        }
    }

    fn render(query: &str, operation: Operation, sets: Vec<FeatureSet<'_>>, project: &Project) -> Result<Rendered, BackendError> {
        let input = RequestInput {
            method: Method::Get,
            query: query.to_string(),
            body: None,
        };
        let (request, _) = Request::parse(&input, &Settings::default());
        DocumentRenderer.render(&RenderRequest {
            request: &request,
            project,
            operation,
            version: "1.3.0",
            feature_sets: sets,
        })
    }

    #[test]
    fn test_wms_capabilities_lists_layers() {
        let project = project();
        let rendered = render("SERVICE=WMS", Operation::GetCapabilities, Vec::new(), &project).unwrap();
        let xml = String::from_utf8(rendered.body).unwrap();
        assert!(xml.contains("<WMS_Capabilities version=\"1.3.0\""));
        assert!(xml.contains("<Title>Test &amp; Co</Title>"));
        assert!(xml.contains("<Name>testlayer</Name>"));
        assert_eq!(rendered.content_type, XML_CONTENT_TYPE);
    }

    #[test]
    fn test_feature_collection_escapes_values() {
        let project = project();
        let sets = vec![FeatureSet {
            layer: &project.layers[0],
            features: project.layers[0].features.iter().collect(),
        }];
        let rendered = render("SERVICE=WFS", Operation::GetFeature, sets, &project).unwrap();
        let xml = String::from_utf8(rendered.body).unwrap();
        assert_eq!(xml.matches("<gml:featureMember>").count(), 1);
        assert!(xml.contains("fid=\"testlayer.1\""));
        assert!(xml.contains("<qgs:name>a&lt;b</qgs:name>"));
        assert!(xml.contains("8.5,44.5 8.5,44.5"));
    }

    #[test]
    fn test_describe_feature_type_infers_types() {
        let project = project();
        let sets = vec![FeatureSet {
            layer: &project.layers[0],
            features: Vec::new(),
        }];
        let rendered = render("SERVICE=WFS", Operation::DescribeFeatureType, sets, &project).unwrap();
        let xml = String::from_utf8(rendered.body).unwrap();
        assert!(xml.contains("<element type=\"long\" name=\"id\"/>"));
        assert!(xml.contains("<element type=\"string\" name=\"name\"/>"));
    }

    #[test]
    fn test_raster_operations_need_an_engine() {
        let project = project();
        let error = render("SERVICE=WMS", Operation::GetMap, Vec::new(), &project).unwrap_err();
        assert_eq!(
            error,
            BackendError::Provider("No rendering engine is configured for GetMap".to_string())
        );
    }
}
