//! Generator configuration.
//!
//! Every option is a command-line flag that can also come from the
//! environment (a `.env` file is loaded first by the binary). The parsed
//! [`Args`] are turned into a [`GeneratorConfig`], which is validated before
//! any tile work starts.

use clap::Parser;
use renderer::TileFormat;
use std::path::PathBuf;
use std::time::Duration;
use tile_common::{CacheError, CacheResult, CacheTarget, CrsCode, Extent};
use tile_grid::{Scheme, XyzMode};

pub const DEFAULT_RENDER_TIMEOUT_MS: u64 = 30_000;

/// Per-tile timeout floor when the target includes remote layers.
pub const REMOTE_MIN_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Parser, Debug, Clone)]
#[command(name = "generate-cache")]
#[command(about = "Generate a raster tile cache for a layer or theme of a map project")]
pub struct Args {
    /// Project file (YAML or JSON)
    #[arg(long, env = "PROJECT_PATH")]
    pub project: PathBuf,

    /// Layer to cache
    #[arg(long, conflicts_with = "theme")]
    pub layer: Option<String>,

    /// Theme to cache
    #[arg(long)]
    pub theme: Option<String>,

    /// Cache root directory
    #[arg(long, env = "CACHE_DIR", default_value = "cache")]
    pub output_dir: PathBuf,

    /// Catalog file (default: <output-dir>/index.json)
    #[arg(long)]
    pub index_path: Option<PathBuf>,

    #[arg(long, default_value_t = 0)]
    pub zoom_min: u32,

    #[arg(long, default_value_t = 0)]
    pub zoom_max: u32,

    /// Lowest zoom advertised in the catalog
    #[arg(long, env = "WMTS_PUBLISH_ZOOM_MIN")]
    pub publish_zoom_min: Option<u32>,

    /// Highest zoom advertised in the catalog
    #[arg(long, env = "WMTS_PUBLISH_ZOOM_MAX")]
    pub publish_zoom_max: Option<u32>,

    /// Extent override, "minx,miny,maxx,maxy" or four values
    #[arg(long, env = "PROJECT_EXTENT", num_args = 1..=4, allow_hyphen_values = true)]
    pub project_extent: Vec<String>,

    /// CRS of the extent override (default: project CRS)
    #[arg(long)]
    pub extent_crs: Option<CrsCode>,

    /// Use the project extent instead of the layer's own
    #[arg(long)]
    pub use_project_extent: bool,

    /// Tiling CRS (default: CRS of the first target layer)
    #[arg(long)]
    pub tile_crs: Option<CrsCode>,

    #[arg(long, default_value = "auto")]
    pub scheme: Scheme,

    #[arg(long, default_value = "partial")]
    pub xyz_mode: XyzMode,

    /// Prefer WMTS when the scheme is auto and the CRS is not Web-Mercator
    #[arg(long)]
    pub wmts: bool,

    /// Tile matrix preset name or path
    #[arg(long, env = "TILE_MATRIX_PRESET")]
    pub tile_matrix_preset: Option<String>,

    #[arg(long, env = "TILE_GRIDS_DIR", default_value = "grids")]
    pub tile_grids_dir: PathBuf,

    /// CRS scale profiles (JSON)
    #[arg(long, env = "CRS_SCALE_PRESETS_PATH")]
    pub crs_scale_presets: Option<PathBuf>,

    #[arg(long, default_value = "png")]
    pub tile_format: TileFormat,

    /// PNG compression level (0-9)
    #[arg(long, env = "PNG_COMPRESSION", default_value_t = 6)]
    pub png_compression: u32,

    /// Allow layers backed by remote services
    #[arg(long)]
    pub allow_remote: bool,

    /// Delay after each tile attempt
    #[arg(long, env = "REMOTE_THROTTLE_MS", default_value_t = 0)]
    pub throttle_ms: u64,

    #[arg(long, env = "RENDER_TIMEOUT_MS", default_value_t = DEFAULT_RENDER_TIMEOUT_MS)]
    pub render_timeout_ms: u64,

    /// Extra attempts per tile after the first
    #[arg(long, env = "TILE_RETRIES", default_value_t = 1)]
    pub tile_retries: u32,

    /// Keep tiles that already exist
    #[arg(long)]
    pub skip_existing: bool,

    /// Smallest acceptable tile in bytes (0 disables the check)
    #[arg(long, env = "MIN_TILE_BYTES", default_value_t = 0)]
    pub min_tile_bytes: u64,

    /// Identifier echoed in the event stream
    #[arg(long)]
    pub job_id: Option<String>,

    /// Diagnostic log file. Without it diagnostics are off, since stdout and
    /// stderr carry the event stream
    #[arg(long, env = "LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Level for the diagnostic log file
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Render a single tile and exit
    #[arg(long)]
    pub single: bool,

    #[arg(long)]
    pub z: Option<u32>,

    #[arg(long)]
    pub x: Option<u32>,

    #[arg(long)]
    pub y: Option<u32>,

    /// Explicit bbox for single-tile mode
    #[arg(long, allow_hyphen_values = true)]
    pub bbox: Option<String>,
}

/// One tile requested in single-tile mode.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleTileRequest {
    pub z: u32,
    pub x: u32,
    pub y: u32,
    pub bbox: Option<Extent>,
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub project: PathBuf,
    pub layer: Option<String>,
    pub theme: Option<String>,
    pub output_dir: PathBuf,
    pub index_path: Option<PathBuf>,
    pub zoom_min: u32,
    pub zoom_max: u32,
    pub publish_zoom_min: Option<u32>,
    pub publish_zoom_max: Option<u32>,
    pub project_extent: Option<Extent>,
    pub extent_crs: Option<CrsCode>,
    pub use_project_extent: bool,
    pub tile_crs: Option<CrsCode>,
    pub scheme: Scheme,
    pub xyz_mode: XyzMode,
    pub prefer_wmts: bool,
    pub tile_matrix_preset: Option<String>,
    pub tile_grids_dir: PathBuf,
    pub crs_scale_presets: Option<PathBuf>,
    pub tile_format: TileFormat,
    pub png_compression: u32,
    pub allow_remote: bool,
    pub throttle_ms: u64,
    pub render_timeout_ms: u64,
    pub tile_retries: u32,
    pub skip_existing: bool,
    pub min_tile_bytes: u64,
    pub job_id: Option<String>,
    pub single: Option<SingleTileRequest>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            project: PathBuf::from("project.yaml"),
            layer: None,
            theme: None,
            output_dir: PathBuf::from("cache"),
            index_path: None,
            zoom_min: 0,
            zoom_max: 0,
            publish_zoom_min: None,
            publish_zoom_max: None,
            project_extent: None,
            extent_crs: None,
            use_project_extent: false,
            tile_crs: None,
            scheme: Scheme::Auto,
            xyz_mode: XyzMode::Partial,
            prefer_wmts: false,
            tile_matrix_preset: None,
            tile_grids_dir: PathBuf::from("grids"),
            crs_scale_presets: None,
            tile_format: TileFormat::Png,
            png_compression: 6,
            allow_remote: false,
            throttle_ms: 0,
            render_timeout_ms: DEFAULT_RENDER_TIMEOUT_MS,
            tile_retries: 1,
            skip_existing: false,
            min_tile_bytes: 0,
            job_id: None,
            single: None,
        }
    }
}

impl GeneratorConfig {
    /// Build from parsed arguments. Only malformed values fail here; the
    /// remaining checks live in [`GeneratorConfig::validate`].
    pub fn from_args(args: Args) -> CacheResult<Self> {
        let project_extent = if args.project_extent.is_empty() {
            None
        } else {
            Some(Extent::parse(&args.project_extent.join(" "))?)
        };
        let single = if args.single {
            let bbox = args.bbox.as_deref().map(Extent::parse).transpose()?;
            match (args.z, args.x, args.y) {
                (Some(z), Some(x), Some(y)) => Some(SingleTileRequest { z, x, y, bbox }),
                _ => {
                    return Err(CacheError::Config(
                        "--single needs --z, --x and --y".to_string(),
                    ))
                }
            }
        } else {
            None
        };

        Ok(Self {
            project: args.project,
            layer: args.layer,
            theme: args.theme,
            output_dir: args.output_dir,
            index_path: args.index_path,
            zoom_min: args.zoom_min,
            zoom_max: args.zoom_max,
            publish_zoom_min: args.publish_zoom_min,
            publish_zoom_max: args.publish_zoom_max,
            project_extent,
            extent_crs: args.extent_crs,
            use_project_extent: args.use_project_extent,
            tile_crs: args.tile_crs,
            scheme: args.scheme,
            xyz_mode: args.xyz_mode,
            prefer_wmts: args.wmts,
            tile_matrix_preset: args.tile_matrix_preset.filter(|p| !p.trim().is_empty()),
            tile_grids_dir: args.tile_grids_dir,
            crs_scale_presets: args.crs_scale_presets,
            tile_format: args.tile_format,
            png_compression: args.png_compression,
            allow_remote: args.allow_remote,
            throttle_ms: args.throttle_ms,
            render_timeout_ms: args.render_timeout_ms,
            tile_retries: args.tile_retries,
            skip_existing: args.skip_existing,
            min_tile_bytes: args.min_tile_bytes,
            job_id: args.job_id,
            single,
        })
    }

    /// First fatal input problem, if any.
    pub fn validate(&self) -> CacheResult<()> {
        self.target()?;
        if self.zoom_max < self.zoom_min {
            return Err(CacheError::InvalidZoom(format!(
                "zoom_max {} < zoom_min {}",
                self.zoom_max, self.zoom_min
            )));
        }
        if let (Some(min), Some(max)) = (self.publish_zoom_min, self.publish_zoom_max) {
            if max < min {
                return Err(CacheError::InvalidZoom(format!(
                    "publish_zoom_max {} < publish_zoom_min {}",
                    max, min
                )));
            }
        }
        if let Some(extent) = &self.project_extent {
            extent.validate()?;
        }
        if self.png_compression > 9 {
            return Err(CacheError::Config(format!(
                "png compression {} is outside 0-9",
                self.png_compression
            )));
        }
        if self.render_timeout_ms == 0 {
            return Err(CacheError::Config("render timeout must be positive".to_string()));
        }
        Ok(())
    }

    /// The layer or theme to cache. Exactly one must be named.
    pub fn target(&self) -> CacheResult<CacheTarget> {
        let target = match (&self.layer, &self.theme) {
            (Some(layer), None) => CacheTarget::layer(layer.trim()),
            (None, Some(theme)) => CacheTarget::theme(theme.trim()),
            (Some(_), Some(_)) => {
                return Err(CacheError::Config(
                    "name either --layer or --theme, not both".to_string(),
                ))
            }
            (None, None) => {
                return Err(CacheError::Config("--layer or --theme is required".to_string()))
            }
        };
        if target.name.is_empty() {
            return Err(CacheError::Config(format!("{} name is empty", target.kind)));
        }
        Ok(target)
    }

    pub fn index_path(&self) -> PathBuf {
        self.index_path
            .clone()
            .unwrap_or_else(|| self.output_dir.join("index.json"))
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }

    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> GeneratorConfig {
        let mut argv = vec!["generate-cache", "--project", "city.yaml"];
        argv.extend_from_slice(args);
        GeneratorConfig::from_args(Args::try_parse_from(argv).unwrap()).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["--layer", "roads"]);
        assert_eq!(config.render_timeout_ms, 30_000);
        assert_eq!(config.tile_retries, 1);
        assert_eq!(config.min_tile_bytes, 0);
        assert_eq!(config.scheme, Scheme::Auto);
        assert_eq!(config.index_path(), PathBuf::from("cache/index.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_extent_as_four_values() {
        let config = parse(&["--layer", "roads", "--project-extent", "-10", "-5", "10", "5"]);
        assert_eq!(config.project_extent, Some(Extent::new(-10.0, -5.0, 10.0, 5.0)));
    }

    #[test]
    fn test_extent_as_comma_list() {
        let config = parse(&["--layer", "roads", "--project-extent", "0,0,100,50"]);
        assert_eq!(config.project_extent, Some(Extent::new(0.0, 0.0, 100.0, 50.0)));
    }

    #[test]
    fn test_typed_options() {
        let config = parse(&[
            "--theme", "base", "--scheme", "wmts", "--xyz-mode", "world",
            "--tile-crs", "epsg:25832", "--tile-format", "jpeg",
        ]);
        assert_eq!(config.scheme, Scheme::Wmts);
        assert_eq!(config.xyz_mode, XyzMode::World);
        assert_eq!(config.tile_crs, Some(CrsCode::parse("EPSG:25832").unwrap()));
        assert_eq!(config.tile_format, TileFormat::Jpeg);
        assert_eq!(config.target().unwrap(), CacheTarget::theme("base"));
    }

    #[test]
    fn test_layer_and_theme_conflict() {
        let result = Args::try_parse_from([
            "generate-cache", "--project", "p.yaml", "--layer", "a", "--theme", "b",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_single_tile_options() {
        let config = parse(&[
            "--layer", "roads", "--single", "--z", "3", "--x", "4", "--y", "5",
            "--bbox", "0,0,10,10",
        ]);
        let single = config.single.unwrap();
        assert_eq!((single.z, single.x, single.y), (3, 4, 5));
        assert_eq!(single.bbox, Some(Extent::new(0.0, 0.0, 10.0, 10.0)));
    }

    #[test]
    fn test_validate_rejects() {
        let base = GeneratorConfig {
            layer: Some("roads".to_string()),
            ..GeneratorConfig::default()
        };

        let inverted = GeneratorConfig {
            zoom_min: 4,
            zoom_max: 2,
            ..base.clone()
        };
        assert!(matches!(inverted.validate(), Err(CacheError::InvalidZoom(_))));

        let no_target = GeneratorConfig {
            layer: None,
            ..base.clone()
        };
        assert!(no_target.validate().unwrap_err().is_fatal());

        let empty_name = GeneratorConfig {
            layer: Some("  ".to_string()),
            ..base.clone()
        };
        assert!(empty_name.validate().unwrap_err().is_fatal());

        let bad_extent = GeneratorConfig {
            project_extent: Some(Extent::new(5.0, 0.0, 1.0, 1.0)),
            ..base.clone()
        };
        assert!(matches!(bad_extent.validate(), Err(CacheError::InvalidExtent(_))));

        let bad_png = GeneratorConfig {
            png_compression: 12,
            ..base
        };
        assert!(bad_png.validate().is_err());
    }
}
