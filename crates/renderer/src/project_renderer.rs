//! Renderer backed by a [`ProjectDocument`].
//!
//! Each request runs on its own tokio task: layers are composited bottom to
//! top onto a tiny-skia pixmap. Fill layers paint their extent; WMS layers
//! issue a GetMap for the request bbox and draw the decoded response.
//! Cancelling a job aborts its task, which also drops any in-flight HTTP
//! request.

use crate::error::RenderError;
use crate::job::{RenderJob, RenderRequest, Renderer, RendererCapabilities};
use crate::project::{LayerSource, ProjectDocument, ProjectLayer};
use crate::raster::RenderedImage;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tile_common::{transform_extent, AxisOrder, CrsCode, Extent};
use tiny_skia::{IntSize, Paint, Pixmap, PixmapPaint, Rect, Transform};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

/// Largest tile edge the project renderer accepts.
pub const MAX_OUTPUT_SIZE: u32 = 4096;

pub struct ProjectRenderer {
    project: Arc<ProjectDocument>,
    client: reqwest::Client,
}

impl ProjectRenderer {
    pub fn new(project: ProjectDocument, http_timeout: Duration) -> Result<Self, RenderError> {
        let client = reqwest::Client::builder()
            .timeout(http_timeout)
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(4)
            .tcp_nodelay(true)
            .build()?;

        Ok(Self {
            project: Arc::new(project),
            client,
        })
    }

    pub fn project(&self) -> &ProjectDocument {
        &self.project
    }

    fn resolve_layers(&self, ids: &[String]) -> Result<Vec<ProjectLayer>, RenderError> {
        ids.iter()
            .map(|id| {
                self.project
                    .find_layer(id)
                    .cloned()
                    .ok_or_else(|| RenderError::UnknownLayer(id.clone()))
            })
            .collect()
    }
}

impl Renderer for ProjectRenderer {
    fn capabilities(&self) -> RendererCapabilities {
        RendererCapabilities {
            name: "project".to_string(),
            cancellable: true,
            reports_activity: true,
            requires_event_pump: false,
            max_output_size: MAX_OUTPUT_SIZE,
        }
    }

    fn start(&self, request: RenderRequest) -> Result<Box<dyn RenderJob>, RenderError> {
        if request.width == 0 || request.height == 0 {
            return Err(RenderError::InvalidRequest(format!(
                "empty output size {}x{}",
                request.width, request.height
            )));
        }
        let layers = self.resolve_layers(&request.layers)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| RenderError::Failed(format!("no async runtime: {}", e)))?;

        let client = self.client.clone();
        let handle = runtime.spawn(draw(client, layers, request));
        Ok(Box::new(ProjectJob {
            handle,
            cancelled: false,
        }))
    }
}

struct ProjectJob {
    handle: JoinHandle<Result<RenderedImage, RenderError>>,
    cancelled: bool,
}

#[async_trait]
impl RenderJob for ProjectJob {
    fn is_active(&self) -> bool {
        !self.cancelled && !self.handle.is_finished()
    }

    fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    fn cancel(&mut self) {
        if !self.cancelled {
            self.handle.abort();
            self.cancelled = true;
        }
    }

    async fn finish(self: Box<Self>) -> Result<Option<RenderedImage>, RenderError> {
        match self.handle.await {
            Ok(result) => result.map(Some),
            Err(e) if e.is_cancelled() => Err(RenderError::Cancelled),
            Err(e) => Err(RenderError::Failed(format!("render task panicked: {}", e))),
        }
    }
}

#[instrument(skip_all, fields(layers = request.layers.len(), width = request.width, height = request.height))]
async fn draw(
    client: reqwest::Client,
    layers: Vec<ProjectLayer>,
    request: RenderRequest,
) -> Result<RenderedImage, RenderError> {
    let mut pixmap = match Pixmap::new(request.width, request.height) {
        Some(p) => p,
        None => {
            return Err(RenderError::InvalidRequest(format!(
                "cannot allocate {}x{} pixmap",
                request.width, request.height
            )))
        }
    };

    for layer in &layers {
        match &layer.source {
            LayerSource::Fill { color } => fill_layer(&mut pixmap, layer, *color, &request)?,
            LayerSource::Wms { .. } => {
                let overlay = fetch_wms(&client, layer, &request).await?;
                pixmap.draw_pixmap(
                    0,
                    0,
                    overlay.as_ref(),
                    &PixmapPaint::default(),
                    Transform::identity(),
                    None,
                );
            }
        }
    }

    Ok(demultiply(&pixmap))
}

fn fill_layer(
    pixmap: &mut Pixmap,
    layer: &ProjectLayer,
    color: [u8; 4],
    request: &RenderRequest,
) -> Result<(), RenderError> {
    let area = match layer.extent {
        None => request.extent,
        Some(extent) => {
            let projected = if layer.crs == request.crs {
                extent
            } else {
                transform_extent(&extent, &layer.crs, &request.crs)
                    .map_err(|e| RenderError::Failed(format!("layer {}: {}", layer.id, e)))?
            };
            match projected.intersection(&request.extent) {
                Some(area) => area,
                None => return Ok(()),
            }
        }
    };

    let Some(rect) = pixel_rect(&area, &request.extent, pixmap.width(), pixmap.height()) else {
        return Ok(());
    };
    let mut paint = Paint::default();
    paint.set_color_rgba8(color[0], color[1], color[2], color[3]);
    paint.anti_alias = false;
    pixmap.fill_rect(rect, &paint, Transform::identity(), None);
    Ok(())
}

/// Map a world-space area to pixel space of an image covering `view`.
fn pixel_rect(area: &Extent, view: &Extent, width: u32, height: u32) -> Option<Rect> {
    let sx = width as f64 / view.width();
    let sy = height as f64 / view.height();
    let left = (area.min_x - view.min_x) * sx;
    let right = (area.max_x - view.min_x) * sx;
    let top = (view.max_y - area.max_y) * sy;
    let bottom = (view.max_y - area.min_y) * sy;
    Rect::from_ltrb(left as f32, top as f32, right as f32, bottom as f32)
}

/// BBOX parameter for a GetMap request. WMS 1.3.0 follows the CRS axis
/// order; earlier versions are always x,y.
pub fn wms_bbox(extent: &Extent, crs: &CrsCode, version: &str) -> String {
    let swap = version.starts_with("1.3") && crs.axis_order() == AxisOrder::Yx;
    let v = if swap {
        [extent.min_y, extent.min_x, extent.max_y, extent.max_x]
    } else {
        extent.to_array()
    };
    format!("{},{},{},{}", v[0], v[1], v[2], v[3])
}

async fn fetch_wms(
    client: &reqwest::Client,
    layer: &ProjectLayer,
    request: &RenderRequest,
) -> Result<Pixmap, RenderError> {
    let LayerSource::Wms {
        url,
        wms_layers,
        styles,
        version,
        format,
    } = &layer.source
    else {
        return Err(RenderError::Failed(format!("layer {} is not a WMS layer", layer.id)));
    };

    let crs_key = if version.starts_with("1.3") { "CRS" } else { "SRS" };
    let params: Vec<(&str, String)> = vec![
        ("SERVICE", "WMS".to_string()),
        ("VERSION", version.clone()),
        ("REQUEST", "GetMap".to_string()),
        ("LAYERS", wms_layers.clone()),
        ("STYLES", styles.clone()),
        (crs_key, request.crs.to_string()),
        ("BBOX", wms_bbox(&request.extent, &request.crs, version)),
        ("WIDTH", request.width.to_string()),
        ("HEIGHT", request.height.to_string()),
        ("FORMAT", format.clone()),
        ("TRANSPARENT", "TRUE".to_string()),
    ];

    debug!(layer = %layer.id, url = %url, "WMS GetMap");
    let response = client
        .get(url)
        .query(&params)
        .send()
        .await?
        .error_for_status()?;

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let body = response.bytes().await?;

    if content_type.contains("xml") {
        let text = String::from_utf8_lossy(&body);
        warn!(layer = %layer.id, "WMS returned a service exception");
        return Err(RenderError::Http(format!(
            "service exception from {}: {}",
            layer.id,
            text.chars().take(200).collect::<String>()
        )));
    }

    let mut rgba = image::load_from_memory(&body)?.to_rgba8();
    if rgba.dimensions() != (request.width, request.height) {
        rgba = image::imageops::resize(
            &rgba,
            request.width,
            request.height,
            image::imageops::FilterType::Triangle,
        );
    }

    premultiplied_pixmap(rgba.into_raw(), request.width, request.height)
}

fn premultiplied_pixmap(mut data: Vec<u8>, width: u32, height: u32) -> Result<Pixmap, RenderError> {
    for px in data.chunks_exact_mut(4) {
        let c = tiny_skia::ColorU8::from_rgba(px[0], px[1], px[2], px[3]).premultiply();
        px.copy_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
    }
    let size = IntSize::from_wh(width, height)
        .ok_or_else(|| RenderError::InvalidRequest(format!("bad size {}x{}", width, height)))?;
    Pixmap::from_vec(data, size)
        .ok_or_else(|| RenderError::Decode("decoded image does not fit pixmap".to_string()))
}

fn demultiply(pixmap: &Pixmap) -> RenderedImage {
    let pixels = pixmap
        .pixels()
        .iter()
        .flat_map(|p| {
            let c = p.demultiply();
            [c.red(), c.green(), c.blue(), c.alpha()]
        })
        .collect();
    RenderedImage {
        width: pixmap.width(),
        height: pixmap.height(),
        pixels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
crs: EPSG:3857
layers:
  - id: land
    crs: EPSG:3857
    provider: fill
    color: [200, 200, 200, 255]
  - id: west
    crs: EPSG:3857
    extent: { min_x: 0, min_y: 0, max_x: 50, max_y: 100 }
    provider: fill
    color: [255, 0, 0, 255]
"#;

    fn renderer() -> ProjectRenderer {
        let doc = ProjectDocument::parse(DOC).unwrap();
        ProjectRenderer::new(doc, Duration::from_secs(5)).unwrap()
    }

    fn request(layers: &[&str]) -> RenderRequest {
        RenderRequest::new(
            layers.iter().map(|s| s.to_string()).collect(),
            CrsCode::web_mercator(),
            Extent::new(0.0, 0.0, 100.0, 100.0),
            (64, 64),
        )
    }

    #[tokio::test]
    async fn test_fill_layers_composite_in_order() {
        let job = renderer().start(request(&["land", "west"])).unwrap();
        let image = job.finish().await.unwrap().unwrap();
        assert_eq!(image.pixel(5, 5), Some([255, 0, 0, 255]));
        assert_eq!(image.pixel(60, 5), Some([200, 200, 200, 255]));
    }

    #[tokio::test]
    async fn test_layer_outside_view_draws_nothing() {
        let mut req = request(&["west"]);
        req.extent = Extent::new(500.0, 500.0, 600.0, 600.0);
        let image = renderer().start(req).unwrap().finish().await.unwrap().unwrap();
        assert!(image.is_fully_transparent());
    }

    #[tokio::test]
    async fn test_unknown_layer_is_rejected() {
        let err = renderer().start(request(&["roads"])).err().unwrap();
        assert!(matches!(err, RenderError::UnknownLayer(name) if name == "roads"));
    }

    #[test]
    fn test_wms_bbox_axis_order() {
        let extent = Extent::new(-10.0, 40.0, 10.0, 60.0);
        assert_eq!(wms_bbox(&extent, &CrsCode::wgs84(), "1.3.0"), "40,-10,60,10");
        assert_eq!(wms_bbox(&extent, &CrsCode::wgs84(), "1.1.1"), "-10,40,10,60");
        assert_eq!(
            wms_bbox(&extent, &CrsCode::web_mercator(), "1.3.0"),
            "-10,40,10,60"
        );
    }
}
