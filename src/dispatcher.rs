//! Resolution of a canonical request to a service operation, and its execution.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use crate::backend::{Feature, FeatureSet, Layer, Project, ProjectStore, RenderRequest, Renderer};
use crate::exception::{DEFAULT_REPORT_VERSION, ServiceError};
use crate::geometry::Bbox;
use crate::request::Request;
use crate::response::Response;

/// The OGC services this server answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OgcService {
    Wms,
    Wfs,
}

impl OgcService {
    pub fn from_name(name: &str) -> Option<OgcService> {
        match name.trim().to_uppercase().as_str() {
            "WMS" => Some(OgcService::Wms),
            "WFS" => Some(OgcService::Wfs),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OgcService::Wms => "WMS",
            OgcService::Wfs => "WFS",
        }
    }

    /// Supported versions, newest first.
    pub fn versions(&self) -> &'static [&'static str] {
        match self {
            OgcService::Wms => &["1.3.0", "1.1.1"],
            OgcService::Wfs => &["1.1.0", "1.0.0"],
        }
    }

    /// Picks the version to answer with: exact match, then prefix match
    /// (`1.3` selects `1.3.0`), otherwise the newest supported version.
    pub fn negotiate_version(&self, requested: &str) -> &'static str {
        let requested = requested.trim();
        let versions = self.versions();
        if requested.is_empty() {
            return versions[0];
        }
        versions
            .iter()
            .find(|v| **v == requested)
            .or_else(|| versions.iter().find(|v| v.starts_with(requested)))
            .copied()
            .unwrap_or(versions[0])
    }

    pub fn operations(&self) -> &'static [Operation] {
        match self {
            OgcService::Wms => &[
                Operation::GetCapabilities,
                Operation::GetProjectSettings,
                Operation::GetMap,
                Operation::GetFeatureInfo,
                Operation::GetPrint,
                Operation::GetLegendGraphic,
            ],
            OgcService::Wfs => &[
                Operation::GetCapabilities,
                Operation::DescribeFeatureType,
                Operation::GetFeature,
            ],
        }
    }

    pub fn operation(&self, name: &str) -> Option<Operation> {
        let upper = name.trim().to_uppercase();
        self.operations()
            .iter()
            .copied()
            .find(|op| op.name().eq_ignore_ascii_case(&upper) || op.aliases().contains(&upper.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetCapabilities,
    GetProjectSettings,
    GetMap,
    GetFeatureInfo,
    GetPrint,
    GetLegendGraphic,
    DescribeFeatureType,
    GetFeature,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::GetCapabilities => "GetCapabilities",
            Operation::GetProjectSettings => "GetProjectSettings",
            Operation::GetMap => "GetMap",
            Operation::GetFeatureInfo => "GetFeatureInfo",
            Operation::GetPrint => "GetPrint",
            Operation::GetLegendGraphic => "GetLegendGraphic",
            Operation::DescribeFeatureType => "DescribeFeatureType",
            Operation::GetFeature => "GetFeature",
        }
    }

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            Operation::GetLegendGraphic => &["GETLEGENDGRAPHICS"],
            _ => &[],
        }
    }

    /// Operations producing a raster whose size is bounded by the project limits.
    pub fn is_sized(&self) -> bool {
        matches!(self, Operation::GetMap | Operation::GetPrint)
    }
}

/// The version to put in an exception report for `request`.
pub fn report_version(request: &Request) -> &'static str {
    OgcService::from_name(request.service())
        .map(|service| service.negotiate_version(request.version()))
        .unwrap_or(DEFAULT_REPORT_VERSION)
}

/// Executes resolved operations against a project.
pub struct Dispatcher {
    store: Arc<dyn ProjectStore>,
    renderer: Arc<dyn Renderer>,
    max_width: u32,
    max_height: u32,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn ProjectStore>,
        renderer: Arc<dyn Renderer>,
        max_width: u32,
        max_height: u32,
    ) -> Self {
        Dispatcher {
            store,
            renderer,
            max_width,
            max_height,
        }
    }

    /// Runs the operation named by `request`, writing its output into `response`.
    pub fn dispatch(&self, request: &Request, response: &mut Response) -> Result<(), ServiceError> {
        let project = match request.project_path() {
            Some(path) => self.store.load(path).map_err(|e| {
                debug!("Project '{}' failed to load: {}", path, e);
                ServiceError::ProjectResolution
            })?,
            None => return Err(ServiceError::ProjectResolution),
        };

        let service =
            OgcService::from_name(request.service()).ok_or(ServiceError::ServiceUnsupported)?;
        let operation = service
            .operation(request.operation())
            .ok_or(ServiceError::ServiceUnsupported)?;
        let version = service.negotiate_version(request.version());
        debug!(
            "Dispatching {} {} {}",
            service.name(),
            version,
            operation.name()
        );

        if operation.is_sized() {
            self.check_size(request, &project)?;
        }

        let feature_sets = match operation {
            Operation::GetFeature => select_features(request, &project)?,
            Operation::DescribeFeatureType => describe_layers(request, &project)?,
            Operation::GetFeatureInfo => feature_info(request, &project)?,
            _ => Vec::new(),
        };

        let rendered = self.renderer.render(&RenderRequest {
            request,
            project: &project,
            operation,
            version,
            feature_sets,
        })?;

        response.set_header("Content-Type", &rendered.content_type);
        let file_name = request.parameter("FILE_NAME").map(download_name);
        if let Some(file_name) = file_name.filter(|f| !f.is_empty()) {
            response.set_header(
                "Content-Disposition",
                &format!("attachment; filename=\"{}\"", file_name),
            );
        }
        response.append_body(&rendered.body);
        Ok(())
    }

    fn check_size(&self, request: &Request, project: &Project) -> Result<(), ServiceError> {
        let max_width = project.max_width.unwrap_or(self.max_width);
        let max_height = project.max_height.unwrap_or(self.max_height);
        let width = dimension(request, "WIDTH")?.unwrap_or(0);
        let height = dimension(request, "HEIGHT")?.unwrap_or(0);

        if width > max_width || height > max_height {
            debug!(
                "Requested {}x{} exceeds {}x{}",
                width, height, max_width, max_height
            );
            return Err(ServiceError::SizeLimit);
        }
        Ok(())
    }
}

/// Strips control characters, quotes and backslashes so the name fits a quoted header value.
fn download_name(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_control() && *c != '"' && *c != '\\')
        .collect::<String>()
        .trim()
        .to_string()
}

fn dimension(request: &Request, name: &str) -> Result<Option<u32>, ServiceError> {
    match request.parameter(name).map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse::<u32>().map(Some).map_err(|_| {
            ServiceError::ParameterParse(format!("{} must be a positive integer, got '{}'", name, value))
        }),
    }
}

fn lookup_layers<'a>(
    project: &'a Project,
    names: &str,
) -> Result<Vec<&'a Layer>, ServiceError> {
    names
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            project.layer(name).ok_or_else(|| {
                ServiceError::ParameterParse(format!("TypeName '{}' is not available", name))
            })
        })
        .collect()
}

/// Parses `FEATUREID=layer.1,layer.2` into the set of requested ids.
fn requested_ids(request: &Request) -> Result<Option<BTreeSet<u64>>, ServiceError> {
    let Some(value) = request.parameter("FEATUREID").filter(|v| !v.trim().is_empty()) else {
        return Ok(None);
    };
    value
        .split(',')
        .map(|token| {
            let id = token.trim().rsplit('.').next().unwrap_or("");
            id.parse::<u64>().map_err(|_| {
                ServiceError::ParameterParse(format!("Invalid FEATUREID '{}'", token.trim()))
            })
        })
        .collect::<Result<BTreeSet<u64>, ServiceError>>()
        .map(Some)
}

/// Applies the spatial and id filters, then the paging window, across all
/// requested layers in order.
fn select_features<'a>(
    request: &Request,
    project: &'a Project,
) -> Result<Vec<FeatureSet<'a>>, ServiceError> {
    let type_names = request
        .parameter("TYPENAME")
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ServiceError::ParameterParse("TYPENAME is mandatory".to_string()))?;
    let layers = lookup_layers(project, type_names)?;
    let ids = requested_ids(request)?;
    let ids = ids.as_ref();
    let spatial = request.spatial_filter();

    let matched: Vec<(usize, &Feature)> = layers
        .iter()
        .copied()
        .enumerate()
        .flat_map(|(index, layer)| {
            layer
                .features
                .iter()
                .filter(move |f| ids.is_none_or(|ids| ids.contains(&f.id)))
                .filter(move |f| spatial.is_none_or(|bbox| feature_intersects(f, bbox)))
                .map(move |f| (index, f))
        })
        .collect();

    let mut sets: Vec<FeatureSet<'a>> = layers
        .into_iter()
        .map(|layer| FeatureSet {
            layer,
            features: Vec::new(),
        })
        .collect();
    for (index, feature) in request.pagination().apply(matched) {
        sets[index].features.push(feature);
    }

    Ok(sets)
}

fn describe_layers<'a>(
    request: &Request,
    project: &'a Project,
) -> Result<Vec<FeatureSet<'a>>, ServiceError> {
    let layers = match request.parameter("TYPENAME").filter(|t| !t.trim().is_empty()) {
        Some(names) => lookup_layers(project, names)?,
        None => project.layers.iter().collect(),
    };
    Ok(layers
        .into_iter()
        .map(|layer| FeatureSet {
            layer,
            features: Vec::new(),
        })
        .collect())
}

/// Finds the features under the queried pixel of the described map.
fn feature_info<'a>(
    request: &Request,
    project: &'a Project,
) -> Result<Vec<FeatureSet<'a>>, ServiceError> {
    let missing = |name: &str| ServiceError::ParameterParse(format!("{} is mandatory for GetFeatureInfo", name));

    let query_layers = request
        .parameter("QUERY_LAYERS")
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| missing("QUERY_LAYERS"))?;
    let layers = lookup_layers(project, query_layers)?;
    let extent = request.spatial_filter().ok_or_else(|| missing("BBOX"))?;
    let width = dimension(request, "WIDTH")?.filter(|w| *w > 0).ok_or_else(|| missing("WIDTH"))?;
    let height = dimension(request, "HEIGHT")?.filter(|h| *h > 0).ok_or_else(|| missing("HEIGHT"))?;
    let i = pixel(request, &["I", "X"])?.ok_or_else(|| missing("I"))?;
    let j = pixel(request, &["J", "Y"])?.ok_or_else(|| missing("J"))?;
    let feature_count = dimension(request, "FEATURE_COUNT")?.unwrap_or(1) as usize;

    let pixel_width = (extent.max_x - extent.min_x) / f64::from(width);
    let pixel_height = (extent.max_y - extent.min_y) / f64::from(height);
    let x = extent.min_x + (f64::from(i) + 0.5) * pixel_width;
    let y = extent.max_y - (f64::from(j) + 0.5) * pixel_height;
    let probe = Bbox::new(
        x - pixel_width / 2.0,
        y - pixel_height / 2.0,
        x + pixel_width / 2.0,
        y + pixel_height / 2.0,
    );

    Ok(layers
        .into_iter()
        .map(|layer| FeatureSet {
            layer,
            features: layer
                .features
                .iter()
                .filter(|f| feature_intersects(f, &probe))
                .take(feature_count)
                .collect(),
        })
        .collect())
}

fn pixel(request: &Request, names: &[&str]) -> Result<Option<u32>, ServiceError> {
    for name in names {
        if let Some(value) = dimension(request, name)? {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

fn feature_intersects(feature: &Feature, bbox: &Bbox) -> bool {
    feature.bbox.as_ref().is_some_and(|b| b.intersects(bbox))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(OgcService::Wms, "", "1.3.0")]
    #[case(OgcService::Wms, "1.3", "1.3.0")]
    #[case(OgcService::Wms, "1.1.1", "1.1.1")]
    #[case(OgcService::Wms, "9.9.9", "1.3.0")]
    #[case(OgcService::Wfs, "1.0.0", "1.0.0")]
    #[case(OgcService::Wfs, "", "1.1.0")]
    fn test_negotiate_version(
        #[case] service: OgcService,
        #[case] requested: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(service.negotiate_version(requested), expected);
    }

    #[test]
    fn test_operation_table() {
        assert_eq!(OgcService::Wms.operation("GETMAP"), Some(Operation::GetMap));
        assert_eq!(
            OgcService::Wms.operation("getlegendgraphics"),
            Some(Operation::GetLegendGraphic)
        );
        assert_eq!(OgcService::Wms.operation("GETFEATURE"), None);
        assert_eq!(
            OgcService::Wfs.operation("DescribeFeatureType"),
            Some(Operation::DescribeFeatureType)
        );
        assert_eq!(OgcService::Wfs.operation("GetMap"), None);
        assert_eq!(OgcService::Wfs.operation(""), None);
        assert_eq!(OgcService::from_name("wcs"), None);
    }
}
