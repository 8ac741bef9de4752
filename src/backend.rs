//! Contracts with the collaborators that own projects, data and rendering.
//!
//! The dispatcher never paints maps or reads data sources itself. It asks a
//! [`ProjectStore`] for the project named by the request and hands the
//! resolved request to a [`Renderer`], which answers with body bytes and a
//! content type.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::dispatcher::Operation;
use crate::geometry::Bbox;
use crate::request::Request;

/// Typed failures reported by collaborators.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("project unavailable: {0}")]
    Project(String),
    #[error("requested output size exceeds the renderer's limits")]
    Size,
    #[error("{0}")]
    Provider(String),
}

/// A loaded project: the layers a server instance publishes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub max_width: Option<u32>,
    #[serde(default)]
    pub max_height: Option<u32>,
    #[serde(default)]
    pub layers: Vec<Layer>,
}

impl Project {
    /// Finds a layer by name, ignoring an optional namespace prefix such as `feature:`.
    pub fn layer(&self, name: &str) -> Option<&Layer> {
        let local = name.rsplit(':').next().unwrap_or(name);
        self.layers.iter().find(|l| l.name == local)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_crs")]
    pub crs: String,
    #[serde(default)]
    pub features: Vec<Feature>,
}

fn default_crs() -> String {
    "EPSG:4326".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub id: u64,
    /// Envelope of the feature geometry; `None` for features without geometry.
    #[serde(default)]
    pub bbox: Option<Bbox>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

/// Features selected for one layer, already filtered and paged.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSet<'a> {
    pub layer: &'a Layer,
    pub features: Vec<&'a Feature>,
}

/// Everything a renderer needs to produce the body of a successful response.
#[derive(Debug)]
pub struct RenderRequest<'a> {
    pub request: &'a Request,
    pub project: &'a Project,
    pub operation: Operation,
    /// Version negotiated for the target service.
    pub version: &'static str,
    /// For GetFeature: the features to serialize. For DescribeFeatureType: the layers to describe.
    pub feature_sets: Vec<FeatureSet<'a>>,
}

/// Output of a renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub body: Vec<u8>,
    pub content_type: String,
}

impl Rendered {
    pub fn new(body: impl Into<Vec<u8>>, content_type: &str) -> Self {
        Rendered {
            body: body.into(),
            content_type: content_type.to_string(),
        }
    }
}

pub trait ProjectStore: Send + Sync {
    fn load(&self, path: &str) -> Result<Arc<Project>, BackendError>;
}

pub trait Renderer: Send + Sync {
    fn render(&self, request: &RenderRequest<'_>) -> Result<Rendered, BackendError>;
}

/// Reads projects described as JSON documents on disk.
#[derive(Debug, Default)]
pub struct JsonProjectStore;

impl ProjectStore for JsonProjectStore {
    fn load(&self, path: &str) -> Result<Arc<Project>, BackendError> {
        let raw = fs::read(path).map_err(|e| BackendError::Project(format!("{}: {}", path, e)))?;
        let project: Project = serde_json::from_slice(&raw)
            .map_err(|e| BackendError::Project(format!("{}: {}", path, e)))?;
        Ok(Arc::new(project))
    }
}

/// Projects registered in memory under a path.
#[derive(Debug, Default)]
pub struct MemoryProjectStore {
    projects: RwLock<HashMap<String, Arc<Project>>>,
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &str, project: Project) {
        if let Ok(mut projects) = self.projects.write() {
            projects.insert(path.to_string(), Arc::new(project));
        }
    }

    pub fn with_project(self, path: &str, project: Project) -> Self {
        self.insert(path, project);
        self
    }
}

impl ProjectStore for MemoryProjectStore {
    fn load(&self, path: &str) -> Result<Arc<Project>, BackendError> {
        let projects = self
            .projects
            .read()
            .map_err(|_| BackendError::Project("project store lock poisoned".to_string()))?;
        projects
            .get(path)
            .cloned()
            .ok_or_else(|| BackendError::Project(format!("no project at {}", path)))
    }
}
