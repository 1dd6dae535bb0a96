use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use pged::backend::{PdfDoc, RgbaFrame};
use pged::config::Config;
use pged::engine::{Backends, RenderingEngine};
use pged::error::{AppError, AppResult};
use pged::transform::{Quality, RotateDirection};

#[derive(Debug, Parser)]
#[command(name = "pged", version, about = "Render and rearrange PDF pages")]
struct Cli {
    /// Config file; defaults to $PGED_CONFIG_PATH or the per-user location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print page counts and page sizes.
    Info {
        #[arg(long)]
        json: bool,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Render one page to a PNG file.
    Render {
        file: PathBuf,
        #[arg(long, default_value_t = 0)]
        page: usize,
        #[arg(long, short)]
        output: PathBuf,
        #[arg(long, value_enum, default_value_t = QualityArg::Normal)]
        quality: QualityArg,
        #[arg(long, value_enum)]
        rotate: Option<DirectionArg>,
    },
    /// Apply edits and save. Order: add, move, rotate, rotate-all, remove.
    Edit {
        file: PathBuf,
        /// Image to append as a new page.
        #[arg(long)]
        add: Vec<PathBuf>,
        /// Move a page, as FROM:TO.
        #[arg(long = "move", value_parser = parse_move)]
        moves: Vec<(usize, usize)>,
        /// Rotate a page clockwise, or counter-clockwise as INDEX:ccw.
        #[arg(long, value_parser = parse_rotate)]
        rotate: Vec<(usize, RotateDirection)>,
        #[arg(long, value_enum)]
        rotate_all: Option<DirectionArg>,
        /// Page to remove; indices refer to the order after the other edits.
        #[arg(long)]
        remove: Vec<usize>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum QualityArg {
    Normal,
    Preview,
    PreviewLow,
}

impl From<QualityArg> for Quality {
    fn from(value: QualityArg) -> Self {
        match value {
            QualityArg::Normal => Quality::Normal,
            QualityArg::Preview => Quality::Preview,
            QualityArg::PreviewLow => Quality::PreviewLow,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DirectionArg {
    Cw,
    Ccw,
}

impl From<DirectionArg> for RotateDirection {
    fn from(value: DirectionArg) -> Self {
        match value {
            DirectionArg::Cw => RotateDirection::Clockwise,
            DirectionArg::Ccw => RotateDirection::CounterClockwise,
        }
    }
}

#[derive(Debug, Serialize)]
struct FileInfo {
    path: PathBuf,
    pages: usize,
    page_sizes: Vec<[f64; 2]>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    env_logger::init();

    if let Err(err) = run(Cli::parse()).await {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> AppResult<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Command::Info { json, files } => info(&files, json),
        Command::Render {
            file,
            page,
            output,
            quality,
            rotate,
        } => render(file, page, &output, quality.into(), rotate, config).await,
        Command::Edit {
            file,
            add,
            moves,
            rotate,
            rotate_all,
            remove,
        } => {
            let edits = Edits {
                add,
                moves,
                rotate,
                rotate_all: rotate_all.map(Into::into),
                remove,
            };
            edit(file, edits, config).await
        }
    }
}

fn info(files: &[PathBuf], json: bool) -> AppResult<()> {
    let mut infos = Vec::with_capacity(files.len());
    for path in files {
        let doc = PdfDoc::open(path)?;
        let page_sizes = (0..doc.page_count())
            .map(|page| doc.page_size(page).map(|size| [size.width, size.height]))
            .collect::<AppResult<Vec<_>>>()?;
        infos.push(FileInfo {
            path: path.clone(),
            pages: doc.page_count(),
            page_sizes,
        });
    }

    if json {
        let out = serde_json::to_string_pretty(&infos)
            .map_err(|err| AppError::invalid_argument(format!("failed to encode info: {err}")))?;
        println!("{out}");
        return Ok(());
    }
    for info in &infos {
        println!("{}: {} pages", info.path.display(), info.pages);
        for (index, [width, height]) in info.page_sizes.iter().enumerate() {
            println!("  {index}: {width:.1} x {height:.1}");
        }
    }
    Ok(())
}

async fn render(
    file: PathBuf,
    page: usize,
    output: &Path,
    quality: Quality,
    rotate: Option<DirectionArg>,
    config: Config,
) -> AppResult<()> {
    let backends = Backends::from_config(&config);
    let mut engine = RenderingEngine::open(&[file], config, backends)?;

    let rendered = match rotate {
        Some(direction) => engine.rotate_page(page, direction.into()).await?,
        None => engine.get_page(page, quality).await?,
    };
    let frame = rendered
        .into_frame()
        .ok_or_else(|| AppError::invalid_argument(format!("page {page} did not render")))?;
    write_png(&frame, output)?;
    log::info!("{:?}", engine.stats());
    engine.close();

    println!("{}", output.display());
    Ok(())
}

#[derive(Debug)]
struct Edits {
    add: Vec<PathBuf>,
    moves: Vec<(usize, usize)>,
    rotate: Vec<(usize, RotateDirection)>,
    rotate_all: Option<RotateDirection>,
    remove: Vec<usize>,
}

async fn edit(file: PathBuf, edits: Edits, config: Config) -> AppResult<()> {
    let backends = Backends::from_config(&config);
    let mut engine = RenderingEngine::open(&[file], config, backends)?;

    for image in edits.add {
        engine.add_page(image);
    }
    for (from, to) in edits.moves {
        engine.rearrange_page(from, to)?;
    }
    for (index, direction) in edits.rotate {
        engine.rotate_page(index, direction).await?;
    }
    if let Some(direction) = edits.rotate_all {
        engine.rotate_all_pages(direction).await?;
    }
    let mut remove = edits.remove;
    remove.sort_unstable_by(|a, b| b.cmp(a));
    remove.dedup();
    for index in remove {
        engine.remove_page(index)?;
    }

    let target = engine.save().await?;
    log::info!("{:?}", engine.stats());
    engine.close();

    println!("{}", target.display());
    Ok(())
}

fn write_png(frame: &RgbaFrame, output: &Path) -> AppResult<()> {
    let image = image::RgbaImage::from_raw(frame.width, frame.height, frame.pixels_to_vec())
        .ok_or_else(|| AppError::invalid_argument("rendered frame has an invalid size"))?;
    image
        .save(output)
        .map_err(|err| AppError::image_load(output, err))
}

fn parse_move(raw: &str) -> Result<(usize, usize), String> {
    let (from, to) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected FROM:TO, got `{raw}`"))?;
    let from = from
        .parse()
        .map_err(|_| format!("invalid page index `{from}`"))?;
    let to = to.parse().map_err(|_| format!("invalid page index `{to}`"))?;
    Ok((from, to))
}

fn parse_rotate(raw: &str) -> Result<(usize, RotateDirection), String> {
    let (index, direction) = match raw.split_once(':') {
        Some((index, "cw")) => (index, RotateDirection::Clockwise),
        Some((index, "ccw")) => (index, RotateDirection::CounterClockwise),
        Some((_, other)) => return Err(format!("unknown direction `{other}`, use cw or ccw")),
        None => (raw, RotateDirection::Clockwise),
    };
    let index = index
        .parse()
        .map_err(|_| format!("invalid page index `{index}`"))?;
    Ok((index, direction))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use clap::Parser;

    use super::{Cli, Command, QualityArg, parse_move, parse_rotate};
    use pged::transform::RotateDirection;

    #[test]
    fn render_subcommand_parses_defaults() {
        let cli = Cli::try_parse_from(["pged", "render", "doc.pdf", "-o", "out.png"])
            .expect("render args should parse");

        let Command::Render {
            file,
            page,
            output,
            quality,
            rotate,
        } = cli.command
        else {
            panic!("expected render subcommand");
        };
        assert_eq!(file, PathBuf::from("doc.pdf"));
        assert_eq!(page, 0);
        assert_eq!(output, PathBuf::from("out.png"));
        assert_eq!(quality, QualityArg::Normal);
        assert!(rotate.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn edit_subcommand_collects_repeated_edits() {
        let cli = Cli::try_parse_from([
            "pged",
            "edit",
            "doc.pdf",
            "--add",
            "scan.png",
            "--move",
            "0:3",
            "--rotate",
            "2:ccw",
            "--rotate",
            "1",
            "--remove",
            "4",
            "--config",
            "custom.toml",
        ])
        .expect("edit args should parse");

        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        let Command::Edit {
            add,
            moves,
            rotate,
            rotate_all,
            remove,
            ..
        } = cli.command
        else {
            panic!("expected edit subcommand");
        };
        assert_eq!(add, vec![PathBuf::from("scan.png")]);
        assert_eq!(moves, vec![(0, 3)]);
        assert_eq!(
            rotate,
            vec![
                (2, RotateDirection::CounterClockwise),
                (1, RotateDirection::Clockwise)
            ]
        );
        assert!(rotate_all.is_none());
        assert_eq!(remove, vec![4]);
    }

    #[test]
    fn info_requires_at_least_one_file() {
        assert!(Cli::try_parse_from(["pged", "info"]).is_err());
        assert!(Cli::try_parse_from(["pged", "info", "--json", "a.pdf", "b.pdf"]).is_ok());
    }

    #[test]
    fn edit_value_parsers_reject_garbage() {
        assert_eq!(parse_move("2:5"), Ok((2, 5)));
        assert!(parse_move("2-5").is_err());
        assert!(parse_move("x:5").is_err());
        assert!(parse_rotate("3:sideways").is_err());
        assert!(parse_rotate("-1").is_err());
    }
}
