use anyhow::{Context, Result};
use ml_postprocess::{
    ElementType, Module, ModuleKind, QuantizationTable, Resolution, Settings, SourceRegion,
    Tensor, TensorsInfo,
};
use std::{fs, path::PathBuf, str::FromStr, time::Instant};
use structopt::StructOpt;
use tracing::{debug, info};
use tracing_subscriber::layer::SubscriberExt;

/// A raw output tensor dump: `PATH:D0xD1x...`
#[derive(Debug, Clone)]
struct TensorArg {
    path: PathBuf,
    dims: Vec<usize>,
}

impl FromStr for TensorArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (path, dims) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("expected PATH:DIMS, got {}", s))?;
        let dims = dims
            .split('x')
            .map(|dim| dim.parse::<usize>().map_err(|e| format!("bad dimension {:?}: {}", dim, e)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            path: PathBuf::from(path),
            dims,
        })
    }
}

/// Parse `X,Y,WIDTH,HEIGHT`.
fn parse_region(s: &str) -> Result<SourceRegion, String> {
    let values = s
        .split(',')
        .map(|v| v.trim().parse::<u32>().map_err(|e| format!("bad region value {:?}: {}", v, e)))
        .collect::<Result<Vec<_>, _>>()?;
    match *values.as_slice() {
        [x, y, width, height] => Ok(SourceRegion::new(x, y, width, height)),
        _ => Err(format!("expected X,Y,WIDTH,HEIGHT, got {}", s)),
    }
}

#[derive(structopt::StructOpt)]
struct Opt {
    /// Decoder to run: posenet or yolov5.
    module: ModuleKind,

    /// Output tensors as PATH:DIMS, e.g. boxes.bin:1x25200x85.
    #[structopt(required = true)]
    tensors: Vec<TensorArg>,

    /// Label file, or the labels themselves.
    #[structopt(short, long)]
    labels: String,

    /// JSON file with module settings, such as the pose skeleton.
    #[structopt(short, long)]
    settings: Option<PathBuf>,

    /// Confidence threshold in percent.
    #[structopt(short, long, default_value = "70")]
    threshold: f64,

    /// Element type of every tensor.
    #[structopt(short = "-T", long, default_value = "FLOAT32")]
    tensor_type: ElementType,

    /// Model input width.
    #[structopt(short, long)]
    width: u32,

    /// Model input height.
    #[structopt(short = "-H", long)]
    height: u32,

    /// Region of the input the model saw, as X,Y,WIDTH,HEIGHT. Defaults to the whole input.
    #[structopt(short, long, parse(try_from_str = parse_region))]
    region: Option<SourceRegion>,

    /// Per-tensor quantization offsets.
    #[structopt(long, use_delimiter = true, allow_hyphen_values = true)]
    q_offsets: Vec<f64>,

    /// Per-tensor quantization scales.
    #[structopt(long, use_delimiter = true)]
    q_scales: Vec<f64>,

    #[structopt(long, default_value = "info", env = "RUST_LOG")]
    log_level: tracing_subscriber::filter::EnvFilter,
}

fn main() -> Result<()> {
    let opt = Opt::from_args();

    tracing::subscriber::set_global_default(
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .with(opt.log_level),
    )?;

    let info = TensorsInfo::new(
        opt.tensor_type,
        opt.tensors.iter().map(|arg| arg.dims.clone()).collect(),
    );
    let mut settings = Settings::new(opt.labels, info).with_threshold(opt.threshold);

    if let Some(path) = &opt.settings {
        let json = fs::read_to_string(path)
            .with_context(|| format!("failed reading module settings from {}", path.display()))?;
        settings = settings.with_json(&json)?;
    }

    if !opt.q_offsets.is_empty() || !opt.q_scales.is_empty() {
        settings = settings.with_quantization(QuantizationTable::new(opt.q_offsets, opt.q_scales));
    }

    let mut module = Module::new(opt.module);
    module
        .configure(&settings)
        .with_context(|| format!("failed configuring {}", opt.module))?;

    let buffers = opt
        .tensors
        .iter()
        .map(|arg| {
            fs::read(&arg.path).with_context(|| format!("failed reading {}", arg.path.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    let tensors = opt
        .tensors
        .iter()
        .zip(&buffers)
        .map(|(arg, data)| Tensor::new(opt.tensor_type, arg.dims.clone(), data))
        .collect::<Result<Vec<_>, _>>()
        .context("failed constructing tensors")?;

    let resolution = Resolution::new(opt.width, opt.height);
    let region = opt.region.unwrap_or_else(|| SourceRegion::full(resolution));
    debug!(?region, ?resolution);

    let start = Instant::now();
    let predictions = module
        .decode(&tensors, &region, resolution)
        .context("failed decoding tensors")?;
    info!(
        message = "decoded",
        module = %opt.module,
        predictions = predictions.len(),
        elapsed = ?start.elapsed()
    );

    println!("{}", serde_json::to_string_pretty(&predictions)?);

    Ok(())
}
