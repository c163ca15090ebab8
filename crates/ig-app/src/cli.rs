use std::path::{Path, PathBuf};
use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use ig_app::generator::StatusSource;
use ig_app::{ClientConfig, GenEvent, Generator, SessionId};
use ig_core::{BrushMode, GenerationSettings, Lora, MaskEncoder, Mode};
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "ig", version, about = "Generate images through a ComfyUI-backed generation API")]
pub struct Cli {
    /// Backend origin, without the `/api` suffix.
    #[arg(long, env = "IG_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Follow job status over the push channel instead of polling.
    #[arg(long, global = true)]
    pub push: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate from a prompt alone.
    Txt2img(GenArgs),
    /// Generate from a prompt and a source image.
    Img2img {
        #[command(flatten)]
        common: GenArgs,
        #[arg(long)]
        image: PathBuf,
    },
    /// Regenerate the painted region of a source image.
    Inpaint {
        #[command(flatten)]
        common: GenArgs,
        #[arg(long)]
        image: PathBuf,
        /// Brush dab as `x,y,radius` in image pixels; append `,erase` to unmask.
        #[arg(long = "stroke", value_parser = parse_stroke)]
        strokes: Vec<Stroke>,
    },
    /// List the models, samplers, schedulers and LoRAs on offer.
    Catalog,
    /// Check that the backend and its ComfyUI are reachable.
    Health,
}

#[derive(Args, Debug)]
pub struct GenArgs {
    pub prompt: String,
    #[arg(long, default_value = "")]
    pub negative: String,
    /// Checkpoint; the first one the backend lists when omitted.
    #[arg(long)]
    pub model: Option<String>,
    #[arg(long, default_value = "euler")]
    pub sampler: String,
    #[arg(long, default_value = "normal")]
    pub scheduler: String,
    #[arg(long)]
    pub width: Option<u32>,
    #[arg(long)]
    pub height: Option<u32>,
    #[arg(long, default_value_t = 20)]
    pub steps: u32,
    #[arg(long, default_value_t = 7.0)]
    pub cfg: f32,
    /// -1 lets the backend pick.
    #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
    pub seed: i64,
    #[arg(long, default_value_t = 1)]
    pub batch: u32,
    #[arg(long)]
    pub denoise: Option<f32>,
    /// LoRA as `name[:strength]`; repeatable.
    #[arg(long = "lora", value_parser = parse_lora)]
    pub loras: Vec<Lora>,
    #[arg(long)]
    pub vae: Option<String>,
    /// Download the results into this directory instead of printing their URLs.
    #[arg(long, short)]
    pub out: Option<PathBuf>,
}

impl GenArgs {
    fn apply(&self, settings: &mut GenerationSettings) {
        settings.prompt = self.prompt.clone();
        settings.negative_prompt = self.negative.clone();
        if let Some(model) = &self.model {
            settings.model = model.clone();
        }
        settings.sampler_name = self.sampler.clone();
        settings.scheduler = self.scheduler.clone();
        if let Some(width) = self.width {
            settings.width = width;
        }
        if let Some(height) = self.height {
            settings.height = height;
        }
        settings.steps = self.steps;
        settings.cfg_scale = self.cfg;
        settings.seed = self.seed;
        settings.batch_size = self.batch;
        if let Some(denoise) = self.denoise {
            settings.denoising_strength = denoise;
        }
        settings.loras = self.loras.clone();
        settings.vae = self.vae.clone();
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stroke {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub mode: BrushMode,
}

fn parse_stroke(value: &str) -> Result<Stroke, String> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    let mode = match parts.get(3) {
        None => BrushMode::Paint,
        Some(&"erase") => BrushMode::Erase,
        Some(&"paint") => BrushMode::Paint,
        Some(other) => return Err(format!("unknown brush mode {other:?}")),
    };
    if !(3..=4).contains(&parts.len()) {
        return Err("expected x,y,radius[,erase]".into());
    }

    let number = |s: &str| s.parse::<f32>().map_err(|e| format!("{s:?}: {e}"));
    Ok(Stroke {
        x: number(parts[0])?,
        y: number(parts[1])?,
        radius: number(parts[2])?,
        mode,
    })
}

fn parse_lora(value: &str) -> Result<Lora, String> {
    match value.rsplit_once(':') {
        Some((name, strength)) if !name.is_empty() => Ok(Lora {
            name: name.to_string(),
            strength: strength.parse().map_err(|e| format!("strength {strength:?}: {e}"))?,
        }),
        _ => Ok(Lora {
            name: value.to_string(),
            strength: 1.0,
        }),
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = ClientConfig::load()?;
    if let Some(api_url) = cli.api_url {
        let origin = ClientConfig::for_origin(api_url);
        config.api_url = origin.api_url;
        config.ws_url = origin.ws_url;
    }

    let source = if cli.push {
        StatusSource::Push
    } else {
        StatusSource::Polling
    };
    let generator = Generator::new(config)?.with_status_source(source);

    match cli.command {
        Command::Health => health(&generator).await,
        Command::Catalog => catalog(&generator).await,
        Command::Txt2img(common) => generate(&generator, Mode::Txt2img, common, None, Vec::new()).await,
        Command::Img2img { common, image } => {
            generate(&generator, Mode::Img2img, common, Some(image), Vec::new()).await
        }
        Command::Inpaint {
            common,
            image,
            strokes,
        } => generate(&generator, Mode::Inpaint, common, Some(image), strokes).await,
    }
}

async fn health(generator: &Generator) -> anyhow::Result<()> {
    let health = generator
        .health()
        .await
        .context("backend is unreachable")?;

    println!(
        "status: {} (api {}, comfyui connected: {})",
        health.status,
        health.api_version.as_deref().unwrap_or("unknown"),
        health.comfyui_connected.unwrap_or(false)
    );
    if !health.is_healthy() {
        bail!(health.error.unwrap_or_else(|| "backend reports it is unhealthy".into()));
    }
    Ok(())
}

async fn catalog(generator: &Generator) -> anyhow::Result<()> {
    let catalog = generator.load_catalog().await;

    println!("models:");
    for model in &catalog.models {
        println!("  {}", model.display_name());
    }
    println!("samplers: {}", catalog.samplers.join(", "));
    println!("schedulers: {}", catalog.schedulers.join(", "));
    if !catalog.loras.is_empty() {
        println!("loras:");
        for lora in &catalog.loras {
            println!("  {}", lora.display_name());
        }
    }
    Ok(())
}

async fn generate(
    generator: &Generator,
    mode: Mode,
    args: GenArgs,
    image: Option<PathBuf>,
    strokes: Vec<Stroke>,
) -> anyhow::Result<()> {
    let catalog = generator.load_catalog().await;
    let mut settings = GenerationSettings::for_mode(mode, &catalog);
    let mut mask = None;

    if let Some(path) = image {
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("could not read {}", path.display()))?;
        let uploaded = generator.upload(&file_name(&path), bytes).await?;
        report(GenEvent::Uploaded(uploaded.clone()));

        if mode.needs_mask() {
            let mut encoder = MaskEncoder::for_image(&uploaded);
            for stroke in &strokes {
                encoder.stroke(stroke.x, stroke.y, stroke.radius, stroke.mode);
            }
            mask = Some(encoder);
        }
        settings = settings.with_init_image(uploaded);
    }
    args.apply(&mut settings);
    for (field, value) in catalog.unlisted(&settings) {
        log::warn!("{field} {value:?} is not in the backend's catalog; sending it anyway");
    }

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, abandoning the job");
            interrupt.cancel();
        }
    });

    let images = generator
        .run(SessionId::new(), &settings, mask.as_ref(), &cancel, report)
        .await?;

    let Some(dir) = args.out else {
        for image in &images {
            println!("{}", image.reference);
        }
        return Ok(());
    };

    tokio::fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("could not create {}", dir.display()))?;
    for image in &images {
        let bytes = generator.fetch_preview(image).await?;
        let target = dir.join(file_name(Path::new(&image.filename)));
        tokio::fs::write(&target, bytes)
            .await
            .with_context(|| format!("could not write {}", target.display()))?;
        println!("{}", target.display());
    }
    Ok(())
}

/// Last path component only, so backend-supplied names cannot escape the output directory.
fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image.png".into())
}

fn report(event: GenEvent) {
    match &event {
        GenEvent::Uploaded(image) => eprintln!("uploaded {}x{}", image.width, image.height),
        GenEvent::Submitted(handle) => eprintln!("submitted job {handle}"),
        GenEvent::Status { status, .. } => eprintln!("  {}", status.describe()),
        GenEvent::Completed { images, .. } => eprintln!("done: {} image(s)", images.len()),
        GenEvent::Failed { error, .. } => match event.handle() {
            Some(handle) => eprintln!("job {handle} failed: {error}"),
            None => eprintln!("failed: {error}"),
        },
    }
}
