#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use ows_server::backend::{
    BackendError, Feature, Layer, Project, RenderRequest, Rendered, Renderer,
};
use ows_server::dispatcher::Operation;
use ows_server::geometry::Bbox;
use ows_server::{DocumentRenderer, MemoryProjectStore, OwsServer, Settings};
use serde_json::Value;

pub const PROJECT: &str = "/projects/test.json";

/// Five features: three inside 8,44,9,45, one outside, one without geometry.
pub fn project() -> Project {
    let feature = |id: u64, bbox: Option<Bbox>| {
        let mut attributes = BTreeMap::new();
        attributes.insert("name".to_string(), Value::from(format!("feature {}", id)));
        attributes.insert("population".to_string(), Value::from(id * 1000));
        Feature {
            id,
            bbox,
            attributes,
        }
    };

    Project {
        title: "Test project".to_string(),
        max_width: Some(5000),
        max_height: Some(5000),
        layers: vec![Layer {
            name: "testlayer".to_string(),
            title: "Test layer".to_string(),
            crs: "EPSG:4326".to_string(),
            features: vec![
                feature(1, Some(Bbox::new(8.1, 44.1, 8.2, 44.2))),
                feature(2, Some(Bbox::new(8.4, 44.4, 8.6, 44.6))),
                feature(3, Some(Bbox::new(8.9, 44.9, 9.5, 45.5))),
                feature(4, Some(Bbox::new(10.0, 46.0, 10.5, 46.5))),
                feature(5, None),
            ],
        }],
    }
}

pub fn store() -> Arc<MemoryProjectStore> {
    Arc::new(MemoryProjectStore::new().with_project(PROJECT, project()))
}

pub fn server() -> OwsServer {
    server_with(Arc::new(DocumentRenderer))
}

pub fn server_with(renderer: Arc<dyn Renderer>) -> OwsServer {
    OwsServer::new(Settings::default(), store(), renderer)
}

/// Feature ids in a GML feature collection, in document order.
pub fn feature_ids(body: &[u8]) -> Vec<u64> {
    let text = String::from_utf8_lossy(body);
    text.match_indices("fid=\"testlayer.")
        .filter_map(|(at, marker)| {
            let rest = &text[at + marker.len()..];
            rest.split('"').next()?.parse().ok()
        })
        .collect()
}

/// Stands in for a raster engine: answers GetMap with `size` bytes of PNG.
pub struct ImageRenderer {
    pub size: usize,
}

impl Renderer for ImageRenderer {
    fn render(&self, request: &RenderRequest<'_>) -> Result<Rendered, BackendError> {
        match request.operation {
            Operation::GetMap => Ok(Rendered::new(
                (0..self.size).map(|i| (i % 251) as u8).collect::<Vec<u8>>(),
                "image/png",
            )),
            _ => DocumentRenderer.render(request),
        }
    }
}
