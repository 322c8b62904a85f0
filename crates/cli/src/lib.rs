use anyhow::{Context, Result};
use ballooner_core::{session_path, BalloonEditor, BalloonStyle, EditorConfig, PageCoordinate, Rotation};
use clap::{Parser, Subcommand};
use pdf_engine::{default_engine, OpenSource, PdfEngine};
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "ballooner-cli")]
#[command(about = "Number features on PDF drawings")]
pub struct Cli {
    /// Log debug output to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable PDF page geometry.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Place a balloon and save the session.
    Place {
        /// Defaults to the sidecar next to --pdf
        #[arg(value_name = "SESSION")]
        session: Option<PathBuf>,
        /// 1-based page number
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        x: f64,
        #[arg(long)]
        y: f64,
        /// default, red, outline or no_arrow
        #[arg(long)]
        style: Option<String>,
        #[arg(long)]
        diameter: Option<f64>,
        #[arg(long)]
        description: Option<String>,
        /// Source PDF to record in the session
        #[arg(long)]
        pdf: Option<PathBuf>,
    },
    /// Renumber all balloons in reading order and save the session.
    Renumber {
        #[arg(value_name = "SESSION")]
        session: PathBuf,
    },
    /// Write a copy of the PDF with balloons drawn onto its pages.
    ExportPdf {
        /// Defaults to the sidecar next to --source
        #[arg(value_name = "SESSION")]
        session: Option<PathBuf>,
        /// Defaults to the PDF recorded in the session
        #[arg(long)]
        source: Option<PathBuf>,
        #[arg(long)]
        output: PathBuf,
        /// Extra page rotation as PAGE=DEGREES, e.g. 2=90
        #[arg(long = "rotate", value_name = "PAGE=DEG", value_parser = parse_rotation)]
        rotations: Vec<(u32, Rotation)>,
    },
    /// Write the balloon table as CSV.
    ExportCsv {
        #[arg(value_name = "SESSION")]
        session: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: u32,
    pages: Vec<PageOutput>,
}

#[derive(Debug, Serialize)]
struct PageOutput {
    page: u32,
    width: f64,
    height: f64,
    rotation: u16,
}

#[derive(Debug, Serialize)]
struct ExportOutput {
    output: String,
    pages_touched: usize,
    balloons_drawn: usize,
    gdt_drawn: usize,
    skipped: usize,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_logging(cli.verbose);

    match cli.command {
        Commands::Info { file } => run_info(&file),
        Commands::Place { session, page, x, y, style, diameter, description, pdf } => {
            let session = resolve_session(session, pdf.as_deref())?;
            let request = PlaceRequest { page, x, y, style, diameter, description, pdf };
            run_place(&session, request)
        }
        Commands::Renumber { session } => run_renumber(&session),
        Commands::ExportPdf { session, source, output, rotations } => {
            let session = resolve_session(session, source.as_deref())?;
            run_export_pdf(&session, source.as_deref(), &output, &rotations)
        }
        Commands::ExportCsv { session, output } => run_export_csv(&session, &output),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .try_init();
}

fn run_info(file: &Path) -> Result<()> {
    ensure_file_exists(file)?;

    let mut engine = default_engine();
    let handle = engine.open(OpenSource::from(file)).context("failed to open PDF")?;

    let page_count = engine.page_count(handle)?;
    let pages = (0..page_count)
        .map(|index| {
            let info = engine.page_info(handle, index)?;
            Ok(PageOutput {
                page: index + 1,
                width: info.width_pt,
                height: info.height_pt,
                rotation: info.rotation,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let payload = InfoOutput { path: file.display().to_string(), page_count, pages };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    engine.close(handle)?;

    Ok(())
}

struct PlaceRequest {
    page: u32,
    x: f64,
    y: f64,
    style: Option<String>,
    diameter: Option<f64>,
    description: Option<String>,
    pdf: Option<PathBuf>,
}

fn run_place(session: &Path, request: PlaceRequest) -> Result<()> {
    if request.page == 0 {
        anyhow::bail!("--page is 1-based and must be >= 1");
    }
    if !request.x.is_finite() || !request.y.is_finite() {
        anyhow::bail!("--x and --y must be finite numbers");
    }

    let mut config = EditorConfig::from_env().context("invalid BALLOONER_* environment")?;
    if let Some(style) = request.style.as_deref() {
        config = config.with_default_style(BalloonStyle::parse(style));
    }
    if let Some(diameter) = request.diameter {
        config = config.with_default_diameter(diameter);
    }

    let mut editor = open_session(session, config)?;
    if let Some(pdf) = request.pdf {
        editor.set_pdf_path(Some(pdf));
    }

    let target = PageCoordinate::new(request.x, request.y);
    let id = editor.place_balloon(target, request.page - 1)?;
    if let Some(description) = request.description {
        editor.set_description(id, description)?;
    }
    save(&editor, session)?;

    let number = editor.registry().get(id).map(|balloon| balloon.number).unwrap_or_default();
    println!("{number}");
    Ok(())
}

fn run_renumber(session: &Path) -> Result<()> {
    ensure_file_exists(session)?;
    let mut editor = open_session(session, EditorConfig::default())?;

    if editor.renumber_all()? {
        save(&editor, session)?;
        println!("renumbered {} balloons", editor.registry().len());
    } else {
        println!("numbering already in reading order");
    }
    Ok(())
}

fn run_export_pdf(
    session: &Path,
    source: Option<&Path>,
    output: &Path,
    rotations: &[(u32, Rotation)],
) -> Result<()> {
    ensure_file_exists(session)?;
    let mut editor = open_session(session, EditorConfig::default())?;

    if let Some(source) = source {
        editor.set_pdf_path(Some(source.to_path_buf()));
    }
    let source = editor
        .pdf_path()
        .map(Path::to_path_buf)
        .context("no source PDF: pass --source or record one in the session")?;
    ensure_file_exists(&source)?;

    for &(page, rotation) in rotations {
        editor.set_page_rotation(page, rotation);
    }

    let summary = editor.export_pdf(output).context("failed to export PDF")?;
    if summary.skipped > 0 {
        eprintln!("warning: {} annotation(s) reference pages beyond the document", summary.skipped);
    }

    let payload = ExportOutput {
        output: output.display().to_string(),
        pages_touched: summary.pages_touched,
        balloons_drawn: summary.balloons_drawn,
        gdt_drawn: summary.gdt_drawn,
        skipped: summary.skipped,
    };
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn run_export_csv(session: &Path, output: &Path) -> Result<()> {
    ensure_file_exists(session)?;
    let editor = open_session(session, EditorConfig::default())?;

    editor
        .export_csv(output)
        .with_context(|| format!("failed to write CSV to {}", output.display()))?;
    println!("{}", output.display());
    Ok(())
}

/// An explicit session path, or the sidecar of `pdf`.
fn resolve_session(session: Option<PathBuf>, pdf: Option<&Path>) -> Result<PathBuf> {
    match (session, pdf) {
        (Some(session), _) => Ok(session),
        (None, Some(pdf)) => Ok(session_path(pdf)),
        (None, None) => anyhow::bail!("no session: pass SESSION or a PDF to use its sidecar"),
    }
}

/// Load `path` into a new editor, or start empty if it does not exist yet.
fn open_session(path: &Path, config: EditorConfig) -> Result<BalloonEditor> {
    let mut editor = BalloonEditor::new(config);
    if path.exists() {
        let errors = editor
            .load_session(path)
            .with_context(|| format!("failed to read session {}", path.display()))?;
        for error in errors {
            eprintln!("warning: {error} (kept unchanged)");
        }
    }
    Ok(editor)
}

fn save(editor: &BalloonEditor, path: &Path) -> Result<()> {
    editor
        .save_session(path)
        .with_context(|| format!("failed to write session {}", path.display()))
}

/// `PAGE=DEG` with a 1-based page and a multiple of 90 degrees.
fn parse_rotation(value: &str) -> std::result::Result<(u32, Rotation), String> {
    let (page, degrees) =
        value.split_once('=').ok_or_else(|| format!("expected PAGE=DEG, got {value:?}"))?;
    let page: u32 = page.trim().parse().map_err(|_| format!("invalid page {page:?}"))?;
    if page == 0 {
        return Err("pages are 1-based".to_string());
    }
    let degrees: i32 = degrees.trim().parse().map_err(|_| format!("invalid angle {degrees:?}"))?;
    let rotation = Rotation::from_degrees(degrees)
        .ok_or_else(|| format!("rotation must be a multiple of 90, got {degrees}"))?;
    Ok((page - 1, rotation))
}

fn ensure_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}
