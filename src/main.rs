use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command, value_parser};
use env_logger::Env;
use geojson2osm::config::{
    ConvertOptions, DEFAULT_CHUNK_SIZE, DEFAULT_INPUT_PATH, DEFAULT_OUTPUT_PATH,
    DEFAULT_SKIP_LINES, DEFAULT_SOURCE_CRS, DEFAULT_TARGET_CRS, ExtractionMode, ProgressEstimate,
};
use geojson2osm::converter::convert_file;
use geojson2osm::mapper::MapOptions;
use log::info;
use std::path::PathBuf;

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let matches = Command::new("geojson2osm")
        .version("0.1.0")
        .about("Convert GeoJSON files to OpenStreetMap XML")
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .default_value(DEFAULT_INPUT_PATH)
                .help("Input GeoJSON file"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .default_value(DEFAULT_OUTPUT_PATH)
                .help("Output OSM XML file"),
        )
        .arg(
            Arg::new("chunk-size")
                .short('c')
                .long("chunk-size")
                .value_name("N")
                .value_parser(value_parser!(u64).range(1..))
                .help("Maximum number of features per batch [default: 10000]"),
        )
        .arg(
            Arg::new("source-crs")
                .short('s')
                .long("source-crs")
                .value_name("CRS")
                .default_value(DEFAULT_SOURCE_CRS)
                .help("CRS of the input coordinates (EPSG:<code> or a proj4 string)"),
        )
        .arg(
            Arg::new("target-crs")
                .short('t')
                .long("target-crs")
                .value_name("CRS")
                .default_value(DEFAULT_TARGET_CRS)
                .help("CRS written to the output (EPSG:<code> or a proj4 string)"),
        )
        .arg(
            Arg::new("skip-lines")
                .long("skip-lines")
                .value_name("N")
                .value_parser(value_parser!(usize))
                .help("Header lines skipped before the document line in lines mode [default: 5]"),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .value_name("MODE")
                .value_parser(["lines", "stream"])
                .default_value("lines")
                .help("Feature extraction mode: one feature per line, or a streaming JSON parser"),
        )
        .arg(
            Arg::new("exact-progress")
                .long("exact-progress")
                .action(ArgAction::SetTrue)
                .help("Count feature lines up front for an exact progress denominator"),
        )
        .arg(
            Arg::new("parallel")
                .long("parallel")
                .action(ArgAction::SetTrue)
                .help("Map features on all cores; output is identical to the sequential mode"),
        )
        .arg(
            Arg::new("keep-closing-vertex")
                .long("keep-closing-vertex")
                .action(ArgAction::SetTrue)
                .help("Emit the repeated closing position of polygon rings as its own node"),
        )
        .get_matches();

    let input_path = matches
        .get_one::<PathBuf>("input")
        .cloned()
        .context("missing input path")?;
    let output_path = matches
        .get_one::<PathBuf>("output")
        .cloned()
        .context("missing output path")?;
    let chunk_size = matches
        .get_one::<u64>("chunk-size")
        .map(|&n| usize::try_from(n).unwrap_or(usize::MAX))
        .unwrap_or(DEFAULT_CHUNK_SIZE);
    let mode: ExtractionMode = matches
        .get_one::<String>("mode")
        .map(String::as_str)
        .unwrap_or("lines")
        .parse()
        .map_err(anyhow::Error::msg)?;

    let options = ConvertOptions {
        chunk_size,
        source_crs: matches
            .get_one::<String>("source-crs")
            .cloned()
            .unwrap_or_else(|| DEFAULT_SOURCE_CRS.to_string()),
        target_crs: matches
            .get_one::<String>("target-crs")
            .cloned()
            .unwrap_or_else(|| DEFAULT_TARGET_CRS.to_string()),
        skip_lines: matches
            .get_one::<usize>("skip-lines")
            .copied()
            .unwrap_or(DEFAULT_SKIP_LINES),
        mode,
        progress: if matches.get_flag("exact-progress") {
            ProgressEstimate::Features
        } else {
            ProgressEstimate::Lines
        },
        parallel: matches.get_flag("parallel"),
        map: MapOptions {
            keep_closing_vertex: matches.get_flag("keep-closing-vertex"),
        },
    };

    info!("Input file: {}", input_path.display());
    info!("Output file: {}", output_path.display());
    info!("Chunk size: {}", options.chunk_size);
    info!("Source CRS: {}", options.source_crs);
    info!("Target CRS: {}", options.target_crs);
    info!("Extraction mode: {}", options.mode);

    convert_file(&input_path, &output_path, &options).with_context(|| {
        format!(
            "failed to convert {} to {}",
            input_path.display(),
            output_path.display()
        )
    })?;

    Ok(())
}
