use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use c2e_scraper::containers::cob::{Cob, CobBlock, CobVariant, Thumbnail};
use c2e_scraper::containers::pray::{BlockType, PrayFile};
use c2e_scraper::formats::c16::C16File;
use c2e_scraper::formats::s16::S16File;
use c2e_scraper::formats::spr::{Palette, SprFile};

#[derive(Parser)]
#[command(name = "c2e_scraper", about = "Inspect and extract Creatures Evolution Engine files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the blocks in a PRAY file
    List {
        file: PathBuf,
        /// Emit the listing as JSON
        #[arg(long)]
        json: bool,
    },
    /// Extract every block of a PRAY file into a directory
    Extract {
        file: PathBuf,
        #[arg(long, default_value = "out")]
        out: PathBuf,
    },
    /// Decode the sprite blocks of a PRAY file into PNG frames
    DumpImages {
        file: PathBuf,
        #[arg(long, default_value = "out")]
        out: PathBuf,
        /// 768-byte palette file, needed for SPR sprites
        #[arg(long)]
        palette: Option<PathBuf>,
    },
    /// Decode a standalone sprite file (.s16 / .c16 / .spr) into PNG frames
    Sprite {
        file: PathBuf,
        #[arg(long, default_value = "out")]
        out: PathBuf,
        #[arg(long)]
        palette: Option<PathBuf>,
    },
    /// Summarise a COB file, optionally writing its thumbnail as PNG
    Cob {
        file: PathBuf,
        #[arg(long)]
        thumbnail: Option<PathBuf>,
        #[arg(long)]
        palette: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct BlockSummary {
    block_type: String,
    name: String,
    size: usize,
    compressed: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match Cli::parse().command {
        Command::List { file, json } => list(&file, json),
        Command::Extract { file, out } => extract(&file, &out),
        Command::DumpImages { file, out, palette } => dump_images(&file, &out, palette.as_deref()),
        Command::Sprite { file, out, palette } => sprite(&file, &out, palette.as_deref()),
        Command::Cob {
            file,
            thumbnail,
            palette,
        } => cob_info(&file, thumbnail.as_deref(), palette.as_deref()),
    }
}

fn load_pray(path: &Path) -> Result<PrayFile> {
    let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    PrayFile::from_bytes(&data).with_context(|| format!("parsing {}", path.display()))
}

fn install_palette(path: Option<&Path>) -> Result<()> {
    if let Some(path) = path {
        Palette::install(Palette::load(path)?);
    }
    Ok(())
}

fn safe_file_name(name: &str) -> String {
    name.replace(['/', '\\'], "_")
}

fn list(path: &Path, json: bool) -> Result<()> {
    let pray = load_pray(path)?;
    let summaries: Vec<BlockSummary> = pray
        .blocks()
        .iter()
        .map(|block| BlockSummary {
            block_type: block.block_type().name(),
            name: block.name().to_owned(),
            size: block.payload_len(),
            compressed: block.is_compressed(),
        })
        .collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        for summary in &summaries {
            println!(
                "{}  {:>8}  {}{}",
                summary.block_type,
                summary.size,
                summary.name,
                if summary.compressed { "  (compressed)" } else { "" }
            );
        }
        println!("{} blocks", summaries.len());
    }
    Ok(())
}

fn extract(path: &Path, out: &Path) -> Result<()> {
    let mut pray = load_pray(path)?;
    fs::create_dir_all(out)?;
    let mut extracted = 0;
    for block in pray.blocks_mut() {
        let name = safe_file_name(block.name());
        if block.block_type().is_tag_dictionary() {
            let tags = block.tags()?;
            let mut map = serde_json::Map::new();
            for (key, value) in tags.ints() {
                map.insert(key.to_owned(), value.into());
            }
            for (key, value) in tags.strings() {
                map.insert(key.to_owned(), value.into());
            }
            let target = out.join(format!("{name}.json"));
            fs::write(&target, serde_json::to_string_pretty(&map)?)?;
            println!("{} -> {}", block.name(), target.display());
        } else if block.block_type() == BlockType::Glst {
            let history = block.history()?;
            let events: Vec<serde_json::Value> = history
                .events()
                .iter()
                .map(|event| {
                    serde_json::json!({
                        "event_type": event.event_type,
                        "world_time": event.world_time,
                        "creature_age": event.creature_age,
                        "timestamp": event.timestamp,
                        "life_stage": event.life_stage,
                        "moniker1": event.moniker1,
                        "moniker2": event.moniker2,
                        "user_text": event.user_text,
                        "photograph": event.photograph,
                        "world_name": event.world_name,
                        "world_uid": event.world_uid,
                    })
                })
                .collect();
            let summary = serde_json::json!({
                "moniker": history.moniker,
                "name": history.name,
                "gender": history.gender,
                "genus": history.genus,
                "species": history.species,
                "mutations": history.mutations,
                "crossovers": history.crossovers,
                "warp_veteran": history.warp_veteran,
                "events": events,
            });
            let target = out.join(format!("{name}.json"));
            fs::write(&target, serde_json::to_string_pretty(&summary)?)?;
            println!("{} -> {}", block.name(), target.display());
        } else {
            let target = out.join(&name);
            fs::write(&target, block.data()?)?;
            println!("{} -> {}", block.name(), target.display());
        }
        extracted += 1;
    }
    println!("Extracted {extracted} blocks");
    Ok(())
}

fn save_frames_s16(sprite: &mut S16File, out: &Path, stem: &str) -> Result<usize> {
    for index in 0..sprite.frame_count() {
        if let Some(frame) = sprite.frame_mut(index) {
            frame
                .surface()?
                .save(out.join(format!("{stem}-{index}.png")))?;
        }
    }
    Ok(sprite.frame_count())
}

fn save_frames_c16(sprite: &C16File, out: &Path, stem: &str) -> Result<usize> {
    for index in 0..sprite.frame_count() {
        if let Some(frame) = sprite.frame(index) {
            frame
                .surface()
                .save(out.join(format!("{stem}-{index}.png")))?;
        }
    }
    Ok(sprite.frame_count())
}

fn save_frames_spr(
    sprite: &mut SprFile,
    palette: &Palette,
    out: &Path,
    stem: &str,
) -> Result<usize> {
    for index in 0..sprite.frame_count() {
        if let Some(frame) = sprite.frame_mut(index) {
            frame
                .surface(palette)?
                .save(out.join(format!("{stem}-{index}.png")))?;
        }
    }
    Ok(sprite.frame_count())
}

fn dump_images(path: &Path, out: &Path, palette: Option<&Path>) -> Result<()> {
    install_palette(palette)?;
    let mut pray = load_pray(path)?;
    fs::create_dir_all(out)?;
    let mut dumped = 0;
    for block in pray.blocks_mut() {
        let name = block.name().to_owned();
        let lower = name.to_lowercase();
        let stem = safe_file_name(&name);
        let frames = if block.block_type() == BlockType::Phot || lower.ends_with(".s16") {
            save_frames_s16(&mut S16File::from_bytes(block.data()?)?, out, &stem)?
        } else if block.block_type() == BlockType::File && lower.ends_with(".c16") {
            save_frames_c16(&C16File::from_bytes(block.data()?)?, out, &stem)?
        } else if block.block_type() == BlockType::File && lower.ends_with(".spr") {
            match Palette::shared() {
                Some(palette) => {
                    save_frames_spr(&mut SprFile::from_bytes(block.data()?)?, palette, out, &stem)?
                }
                None => {
                    eprintln!("Skipping {name}: no palette given (use --palette)");
                    continue;
                }
            }
        } else {
            continue;
        };
        println!("{name}: {frames} frames");
        dumped += frames;
    }
    println!("Wrote {dumped} frames to {}", out.display());
    Ok(())
}

fn sprite(path: &Path, out: &Path, palette: Option<&Path>) -> Result<()> {
    install_palette(palette)?;
    let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    fs::create_dir_all(out)?;
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sprite".into());
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let frames = match extension.as_str() {
        "s16" => save_frames_s16(&mut S16File::from_bytes(&data)?, out, &stem)?,
        "c16" => save_frames_c16(&C16File::from_bytes(&data)?, out, &stem)?,
        "spr" => match Palette::shared() {
            Some(palette) => save_frames_spr(&mut SprFile::from_bytes(&data)?, palette, out, &stem)?,
            None => bail!("SPR sprites need a palette (use --palette)"),
        },
        other => bail!("unrecognised sprite extension {other:?}"),
    };
    println!("Wrote {frames} frames to {}", out.display());
    Ok(())
}

fn cob_info(path: &Path, thumbnail_out: Option<&Path>, palette: Option<&Path>) -> Result<()> {
    install_palette(palette)?;
    let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let mut cob = Cob::from_bytes(&data).with_context(|| format!("parsing {}", path.display()))?;
    println!(
        "{}: {} COB, {} blocks",
        path.display(),
        match cob.variant() {
            CobVariant::Legacy => "legacy",
            CobVariant::Tagged => "tagged",
        },
        cob.blocks().len()
    );
    for block in cob.blocks_mut() {
        match block {
            CobBlock::Agent(agent) => {
                println!("agent: {}", agent.name);
                if !agent.description.is_empty() {
                    println!("  description: {}", agent.description);
                }
                println!(
                    "  quantity: {}  scripts: {}  dependencies: {}",
                    if agent.quantity_available < 0 {
                        "unlimited".to_owned()
                    } else {
                        agent.quantity_available.to_string()
                    },
                    agent.event_scripts.len(),
                    agent.dependencies.len()
                );
                for dependency in &agent.dependencies {
                    println!("  depends on {:?} ({:?})", dependency.name, dependency.kind);
                }
                if let (Some(target), Some(thumbnail)) = (thumbnail_out, agent.thumbnail.as_mut()) {
                    match thumbnail {
                        Thumbnail::S16(frame) => frame.surface()?.save(target)?,
                        Thumbnail::Spr(frame) => match Palette::shared() {
                            Some(palette) => frame.surface(palette)?.save(target)?,
                            None => bail!("this thumbnail needs a palette (use --palette)"),
                        },
                    }
                    println!("  thumbnail -> {}", target.display());
                }
            }
            CobBlock::Author(author) => {
                println!(
                    "author: {} <{}> v{}.{}",
                    author.author_name, author.author_email, author.version, author.revision
                );
            }
            CobBlock::File(file) => {
                println!(
                    "file: {} ({} bytes, {:?})",
                    file.name,
                    file.contents.len(),
                    file.kind
                );
            }
            CobBlock::Unknown { tag, data } => {
                println!(
                    "unknown block {:?} ({} bytes)",
                    String::from_utf8_lossy(tag),
                    data.len()
                );
            }
        }
    }
    Ok(())
}
