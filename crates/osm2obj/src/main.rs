use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use hgt::ElevationStore;
use osmwave::{
    features::read_features, BuildingOptions, DelaunayTriangulator, GeoBboxDeg, NormalMode,
    ObjWriter, Projection, Session, TerrainOptions, TransverseMercator,
};

#[derive(Parser, Debug)]
#[command(name = "osm2obj", version, about = "Buildings and SRTM terrain to Wavefront OBJ")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extrude building footprints from an OSM .pbf or GeoJSON file.
    Buildings {
        /// Input file (.pbf, .json or .geojson)
        input: PathBuf,

        #[command(flatten)]
        common: Common,

        /// Also mesh the terrain under the buildings.
        #[arg(long, default_value_t = false)]
        terrain: bool,

        /// Height in metres for buildings without height or level tags.
        #[arg(long, default_value_t = osmwave::tags::DEFAULT_BUILDING_HEIGHT)]
        default_height: f64,

        /// Write `mtllib <PATH>` after the header.
        #[arg(long)]
        mtllib: Option<String>,

        /// Write `mtl <NAME>` ahead of the buildings.
        #[arg(long)]
        material: Option<String>,

        #[command(flatten)]
        mesh: MeshArgs,
    },

    /// Mesh the terrain inside a lon/lat box.
    #[command(allow_negative_numbers = true)]
    Terrain {
        /// West longitude
        x1: f64,
        /// South latitude
        y1: f64,
        /// East longitude
        x2: f64,
        /// North latitude
        y2: f64,

        #[command(flatten)]
        common: Common,

        #[command(flatten)]
        mesh: MeshArgs,
    },
}

#[derive(clap::Args, Debug)]
struct Common {
    /// Directory holding the .hgt / .hgt.zip tiles.
    #[arg(short = 'e', long, env = "OSMWAVE_ELEVATION_DIR")]
    elevation_dir: PathBuf,

    /// PROJ definition (+proj=tmerc or +proj=utm). Default: transverse
    /// Mercator centred on the data.
    #[arg(long)]
    proj: Option<String>,

    /// Output file; stdout when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct MeshArgs {
    /// Height difference (metres) below which terrain samples are dropped.
    #[arg(long, default_value_t = osmwave::terrain::DEFAULT_TOLERANCE)]
    tolerance: f64,

    /// Terrain sample spacing in arc-seconds.
    #[arg(long, default_value_t = 1.0)]
    step_arcsec: f64,

    /// Upper bound on thinning passes.
    #[arg(long, default_value_t = osmwave::terrain::DEFAULT_MAX_PASSES)]
    max_passes: usize,

    /// Normalize vertex normals instead of writing accumulated sums.
    #[arg(long, default_value_t = false)]
    unit_normals: bool,
}

impl MeshArgs {
    fn options(&self) -> TerrainOptions {
        TerrainOptions {
            tolerance: self.tolerance,
            step_deg: self.step_arcsec / 3600.0,
            max_passes: self.max_passes,
            normals: if self.unit_normals {
                NormalMode::Unit
            } else {
                NormalMode::Accumulated
            },
        }
    }
}

fn projection_for(def: Option<&str>, bounds: &GeoBboxDeg) -> Result<TransverseMercator> {
    match def {
        Some(def) => def
            .parse::<TransverseMercator>()
            .with_context(|| format!("invalid --proj {def:?}")),
        None => Ok(TransverseMercator::centered_on(bounds)),
    }
}

fn open_store(dir: &Path, bounds: &GeoBboxDeg) -> Result<ElevationStore> {
    let cells = bounds.cells()?;
    let store = ElevationStore::open(cells, dir)
        .with_context(|| format!("loading elevation tiles from {}", dir.display()))?;

    let failed = store.load_report().len();
    if failed > 0 {
        warn!(
            "{} elevation cell(s) unavailable; features over them will be skipped",
            failed
        );
    }

    Ok(store)
}

fn open_output(path: Option<&Path>) -> Result<ObjWriter<BufWriter<Box<dyn Write>>>> {
    let sink: Box<dyn Write> = match path {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };
    Ok(ObjWriter::new(BufWriter::new(sink)))
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let triangulator = DelaunayTriangulator;

    match args.command {
        Command::Buildings {
            input,
            common,
            terrain,
            default_height,
            mtllib,
            material,
            mesh,
        } => {
            let features = read_features(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let bounds = features
                .bounds
                .with_context(|| format!("{} holds no building footprints", input.display()))?;

            let projection = projection_for(common.proj.as_deref(), &bounds)?;
            let store = open_store(&common.elevation_dir, &bounds)?;
            let session = Session {
                elevation: &store,
                projection: &projection,
                triangulator: &triangulator,
            };

            let options = BuildingOptions {
                default_height,
                material_library: mtllib,
                material,
            };
            let terrain_options = mesh.options();

            let mut writer = open_output(common.output.as_deref())?;
            let stats = osmwave::buildings_to_obj(
                &mut writer,
                &session,
                &input.display().to_string(),
                &features,
                &options,
                terrain.then_some(&terrain_options),
            )
            .context("writing mesh")?;

            info!(
                "Done: {} buildings, {} skipped, {} vertices{}",
                stats.rings_emitted,
                stats.skipped(),
                writer.vertex_count(),
                match stats.terrain {
                    Some(t) => format!(", terrain {} triangles", t.triangles),
                    None => String::new(),
                }
            );
        }

        Command::Terrain {
            x1,
            y1,
            x2,
            y2,
            common,
            mesh,
        } => {
            let bbox = GeoBboxDeg::new(x1, y1, x2, y2)?;
            let projection = projection_for(common.proj.as_deref(), &bbox)?;
            let store = open_store(&common.elevation_dir, &bbox)?;
            let session = Session {
                elevation: &store,
                projection: &projection,
                triangulator: &triangulator,
            };

            info!("Projection: {}", projection.definition());

            let mut writer = open_output(common.output.as_deref())?;
            let stats = osmwave::terrain_to_obj(
                &mut writer,
                &session,
                &common.elevation_dir.display().to_string(),
                &bbox,
                &mesh.options(),
            )
            .context("writing terrain mesh")?;

            info!(
                "Done: {}x{} samples, {} vertices, {} triangles",
                stats.rows, stats.cols, stats.vertices, stats.triangles
            );
        }
    }

    Ok(())
}
