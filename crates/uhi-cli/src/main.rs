//! Urban heat island hotspot analysis for one city and year.
//!
//! Writes the run's JSON bundle to `<output>/<city_slug>/<year>/`.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::json;
use uhi_core::aoi::square;
use uhi_core::{
    AnalysisConfig, DirectoryProvider, HotspotAnalysis, HotspotMask, HotspotPipeline, LayerProvider, ProviderConfig,
    RasterLayer, RunRequest, SyntheticProvider,
};

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "uhi", about = "Detect and validate urban heat island hotspots")]
struct Args {
    /// City name, resolved through the boundary catalog
    city: String,

    /// Country, to disambiguate cities sharing a name
    #[arg(long)]
    country: Option<String>,

    #[arg(long, default_value = "2023")]
    year: i32,

    /// Layer store root (`<root>/<year>/<kind>.json`, `fallback/`, `static/`)
    #[arg(long, default_value = "data")]
    data_root: PathBuf,

    /// Boundary catalog (GeoJSON FeatureCollection); defaults to `<data-root>/boundaries.geojson`
    #[arg(long)]
    boundaries: Option<PathBuf>,

    /// Upstream project identifier, recorded in the index
    #[arg(long)]
    project: Option<String>,

    /// Analysis configuration JSON; missing keys take their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output root directory (created if absent)
    #[arg(short, long, default_value = "outputs")]
    output: PathBuf,

    /// Generate a synthetic city instead of reading the layer store
    #[arg(long)]
    synthetic: bool,

    /// Seed of the synthetic city
    #[arg(long, default_value = "42")]
    synthetic_seed: u32,

    /// South-west corner and size (degrees) of the synthetic AOI
    #[arg(long, num_args = 3, value_names = ["LON", "LAT", "SIZE"], default_values_t = [10.0, 45.0, 0.3])]
    synthetic_box: Vec<f64>,
}

// ── Bundle ───────────────────────────────────────────────────────────────────

fn slug(city: &str) -> String {
    city.to_lowercase().replace(' ', "_")
}

/// Write through a temporary sibling and rename, so a reader never sees a
/// half-written file.
fn write_json(path: &Path, value: &serde_json::Value) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec_pretty(value)?;
    fs::write(&tmp, bytes).with_context(|| format!("Write failed: {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("Rename failed: {}", path.display()))?;
    Ok(())
}

/// A self-masked hotspot mask in the layer-store format: 1.0 where hot.
fn mask_layer(mask: &HotspotMask) -> RasterLayer {
    mask.map(|hot| hot.then_some(1.0f32))
}

fn write_bundle(output: &Path, args: &Args, config: &AnalysisConfig, analysis: &HotspotAnalysis) -> Result<PathBuf> {
    let city_dir = output.join(slug(&args.city)).join(analysis.year.to_string());
    fs::create_dir_all(&city_dir).with_context(|| format!("Cannot create {}", city_dir.display()))?;

    // No index may survive while its assets are being replaced.
    let index_path = city_dir.join("index.json");
    match fs::remove_file(&index_path) {
        Ok(()) => log::debug!("removed previous {}", index_path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).with_context(|| format!("Cannot remove {}", index_path.display())),
    }

    let mut assets = vec![
        ("thresholds.json", serde_json::to_value(analysis.thresholds)?),
        ("spatial_stats.json", analysis.spatial_stats.report()),
        ("summary.json", serde_json::to_value(analysis.summary())?),
        ("vote_count.json", serde_json::to_value(&analysis.vote_count)?),
        ("preliminary_hotspots.json", serde_json::to_value(mask_layer(&analysis.preliminary))?),
    ];
    if let Some(validated) = analysis.validated() {
        assets.push(("validated_hotspots.json", serde_json::to_value(mask_layer(validated))?));
    }
    let mut index_assets = serde_json::Map::new();
    for (name, value) in &assets {
        let path = city_dir.join(name);
        write_json(&path, value)?;
        let rel = path.strip_prefix(output).unwrap_or(&path);
        index_assets.insert((*name).to_string(), json!(rel.display().to_string()));
    }

    // The index goes last: its presence marks a complete bundle.
    let index = json!({
        "city": args.city,
        "country": args.country,
        "year": analysis.year,
        "project": args.project,
        "assets": index_assets,
        "config": config,
        "notes": {
            "validation": format!(
                "Getis-Ord Gi* and Local Moran's I computed on {} samples of the threshold exceedance count.",
                analysis.samples.len()
            ),
        },
    });
    write_json(&index_path, &index)?;
    Ok(city_dir)
}

// ── Main ─────────────────────────────────────────────────────────────────────

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig> {
    let Some(path) = path else {
        return Ok(AnalysisConfig::default());
    };
    let text = fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

fn build_provider(args: &Args) -> Result<Box<dyn LayerProvider>> {
    if args.synthetic {
        let &[lon, lat, size] = args.synthetic_box.as_slice() else {
            bail!("--synthetic-box takes LON LAT SIZE");
        };
        let aoi = square(&args.city, lon, lat, size)?;
        let provider = SyntheticProvider::new(args.synthetic_seed).with_city(&args.city, args.country.as_deref(), aoi);
        return Ok(Box::new(provider));
    }

    let mut provider_config = ProviderConfig::new(&args.data_root);
    if let Some(boundaries) = &args.boundaries {
        provider_config.boundaries = boundaries.clone();
    }
    provider_config.project = args.project.clone();
    Ok(Box::new(DirectoryProvider::new(provider_config)))
}

fn main() -> Result<()> {
    pretty_env_logger::init();
    let args = Args::parse();

    let config = load_config(args.config.as_deref())?;
    let provider = build_provider(&args)?;
    let pipeline = HotspotPipeline::new(provider.as_ref(), config.clone()).context("Invalid analysis configuration")?;

    let request = RunRequest {
        city: args.city.clone(),
        country: args.country.clone(),
        year: args.year,
    };
    let analysis = pipeline
        .run(&request)
        .with_context(|| format!("Analysis failed for {} ({})", args.city, args.year))?;

    let city_dir = write_bundle(&args.output, &args, &config, &analysis)?;
    let summary = analysis.summary();
    log::info!(
        "{}: {} preliminary px, {} validated px → {}",
        summary.city,
        summary.preliminary_px,
        summary
            .validated_px
            .map_or_else(|| "no".to_string(), |n| n.to_string()),
        city_dir.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uhi_core::provider::directory::read_layer;

    #[test]
    fn slug_lowercases_and_underscores() {
        assert_eq!(slug("San Luis Obispo"), "san_luis_obispo");
        assert_eq!(slug("phoenix"), "phoenix");
    }

    #[test]
    fn missing_config_keys_take_defaults() {
        let cfg: AnalysisConfig = serde_json::from_str(r#"{"seed": 7, "analysis_scale_m": 250.0}"#).unwrap();
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.analysis_scale_m, 250.0);
        assert_eq!(cfg.sample_count, AnalysisConfig::default().sample_count);
    }

    fn synthetic_run(out: &Path) -> (Args, AnalysisConfig, HotspotAnalysis) {
        let args = Args::parse_from([
            "uhi",
            "Test Town",
            "--synthetic",
            "--synthetic-box",
            "10.0",
            "45.0",
            "0.15",
            "--output",
            out.to_str().unwrap(),
        ]);
        let config = AnalysisConfig { analysis_scale_m: 250.0, ..AnalysisConfig::default() };
        let provider = build_provider(&args).unwrap();
        let pipeline = HotspotPipeline::new(provider.as_ref(), config.clone()).unwrap();
        let analysis = pipeline
            .run(&RunRequest { city: args.city.clone(), country: None, year: args.year })
            .unwrap();
        (args, config, analysis)
    }

    #[test]
    fn synthetic_run_writes_a_complete_bundle() {
        let out = std::env::temp_dir().join(format!("uhi-cli-bundle-{}", std::process::id()));
        let _ = fs::remove_dir_all(&out);
        let (args, config, analysis) = synthetic_run(&out);

        let dir = write_bundle(&out, &args, &config, &analysis).unwrap();
        assert_eq!(dir, out.join("test_town").join("2023"));
        for name in [
            "thresholds.json",
            "spatial_stats.json",
            "summary.json",
            "vote_count.json",
            "preliminary_hotspots.json",
            "index.json",
        ] {
            assert!(dir.join(name).is_file(), "{name} missing");
        }
        let thresholds: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.join("thresholds.json")).unwrap()).unwrap();
        for key in ["lst80", "ndvi20", "ntl80", "albedo20", "imperv80", "bld80", "pop80"] {
            assert!(thresholds[key].is_number(), "{key}");
        }

        // Raster products read back through the layer store.
        let votes = read_layer(&dir.join("vote_count.json")).unwrap();
        assert_eq!((votes.width, votes.height), (analysis.vote_count.width, analysis.vote_count.height));
        assert_eq!(votes.data, analysis.vote_count.map(|v| Some(v as f32)).data);
        let preliminary = read_layer(&dir.join("preliminary_hotspots.json")).unwrap();
        assert_eq!(preliminary.count_present(), analysis.preliminary.count_present());
        assert!(preliminary.values().all(|v| v == 1.0));
        match analysis.validated() {
            Some(validated) => {
                let written = read_layer(&dir.join("validated_hotspots.json")).unwrap();
                assert_eq!(written.count_present(), validated.count_present());
            }
            None => assert!(!dir.join("validated_hotspots.json").exists()),
        }

        let index: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.join("index.json")).unwrap()).unwrap();
        let listed = index["assets"].as_object().unwrap();
        assert_eq!(listed.len(), 5 + usize::from(analysis.validated().is_some()));
        assert_eq!(listed.contains_key("validated_hotspots.json"), analysis.validated().is_some());
        let _ = fs::remove_dir_all(&out);
    }

    #[test]
    fn failed_rewrite_leaves_no_index() {
        let out = std::env::temp_dir().join(format!("uhi-cli-rerun-{}", std::process::id()));
        let _ = fs::remove_dir_all(&out);
        let (args, config, analysis) = synthetic_run(&out);

        // An earlier complete bundle, then a summary path that cannot be replaced.
        let dir = out.join("test_town").join("2023");
        fs::create_dir_all(dir.join("summary.json").join("blocker")).unwrap();
        fs::write(dir.join("index.json"), "{}").unwrap();

        assert!(write_bundle(&out, &args, &config, &analysis).is_err());
        assert!(!dir.join("index.json").exists());
        assert!(dir.join("thresholds.json").is_file());
        let _ = fs::remove_dir_all(&out);
    }
}
