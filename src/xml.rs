//! Decoding of XML request bodies posted to the server.
//!
//! Only the parts that have a query-string equivalent are extracted; the
//! result is merged into the canonical [`Request`](crate::request::Request).

use roxmltree::{Document, Node};

use crate::geometry::Bbox;
use crate::request::RequestError;

/// The key/value view of a posted request document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostBody {
    /// Local name of the root element, e.g. `GetFeature`.
    pub operation: String,
    pub service: Option<String>,
    pub version: Option<String>,
    pub type_names: Vec<String>,
    pub start_index: Option<String>,
    pub max_features: Option<String>,
    pub bbox: Option<Bbox>,
}

pub fn parse_body(body: &[u8]) -> Result<PostBody, RequestError> {
    let text =
        std::str::from_utf8(body).map_err(|e| RequestError::MalformedBody(e.to_string()))?;
    let document = Document::parse(text).map_err(|e| RequestError::MalformedBody(e.to_string()))?;
    let root = document.root_element();

    let mut post = PostBody {
        operation: root.tag_name().name().to_string(),
        service: attribute(root, "service"),
        version: attribute(root, "version"),
        start_index: attribute(root, "startIndex"),
        max_features: attribute(root, "maxFeatures"),
        ..PostBody::default()
    };

    for query in children(root, "Query") {
        if let Some(type_name) = attribute(query, "typeName") {
            post.type_names.push(type_name);
        }
        // WFS 1.0 clients put paging on the Query element.
        if post.max_features.is_none() {
            post.max_features = attribute(query, "maxFeatures");
        }
        if post.start_index.is_none() {
            post.start_index = attribute(query, "startIndex");
        }
        if post.bbox.is_none() {
            post.bbox = query_bbox(query)?;
        }
    }

    Ok(post)
}

fn query_bbox(query: Node) -> Result<Option<Bbox>, RequestError> {
    let Some(bbox) = query
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == "BBOX")
    else {
        return Ok(None);
    };

    if let Some(envelope) = child(bbox, "Envelope") {
        let lower = child(envelope, "lowerCorner").and_then(|n| n.text());
        let upper = child(envelope, "upperCorner").and_then(|n| n.text());
        return match (lower, upper) {
            (Some(lower), Some(upper)) => Bbox::from_corners(lower, upper)
                .map(Some)
                .map_err(RequestError::InvalidBbox),
            _ => Err(RequestError::InvalidBbox(
                "Envelope requires lowerCorner and upperCorner".to_string(),
            )),
        };
    }

    // GML 2 form: <gml:Box><gml:coordinates>8,44 9,45</gml:coordinates></gml:Box>
    if let Some(coordinates) = child(bbox, "Box")
        .and_then(|b| child(b, "coordinates"))
        .and_then(|n| n.text())
    {
        let corners: Vec<String> = coordinates
            .split_whitespace()
            .map(|pair| pair.replace(',', " "))
            .collect();
        return match corners.as_slice() {
            [lower, upper] => Bbox::from_corners(lower, upper)
                .map(Some)
                .map_err(RequestError::InvalidBbox),
            _ => Err(RequestError::InvalidBbox(format!(
                "Box coordinates must hold two corners, got '{}'",
                coordinates.trim()
            ))),
        };
    }

    Err(RequestError::InvalidBbox(
        "BBOX filter without Envelope or Box".to_string(),
    ))
}

fn attribute(node: Node, name: &str) -> Option<String> {
    node.attributes()
        .find(|a| a.name().eq_ignore_ascii_case(name))
        .map(|a| a.value().trim().to_string())
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

fn children<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |n| n.is_element() && n.tag_name().name() == name)
}
