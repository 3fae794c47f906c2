//! Main entry point for the streamzip CLI application.
//!
//! Archives are decoded while they are read, from a local file, an HTTP
//! download or stdin, and entries are listed or extracted as they arrive.

use anyhow::Result;
use clap::Parser;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use streamzip::{
    ChunkSource, Cli, Entry, EntryReport, EntryStream, Error, HttpSource, ReaderSource,
    StreamExtractor,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Arc::new(Cli::parse());
    let extractor = StreamExtractor::with_config(cli.extractor_config())?;

    if cli.is_http_url() {
        // Decode while the download is in flight
        let mut source = HttpSource::new(&cli.file).await?;
        process_zip(&extractor, &mut source, cli.clone()).await?;

        if !cli.is_quiet() {
            eprintln!(
                "\nTotal bytes transferred: {}",
                format_size(source.transferred_bytes())
            );
        }
    } else if cli.is_stdin() {
        let mut source = ReaderSource::new(tokio::io::stdin());
        process_zip(&extractor, &mut source, cli).await?;
    } else {
        let mut source = ReaderSource::open(Path::new(&cli.file)).await?;
        process_zip(&extractor, &mut source, cli).await?;
    }

    Ok(())
}

/// Run the extractor over `source` while a consumer task handles entries.
///
/// Entries are handled strictly in archive order: the next one is only looked
/// at once the content of the previous one has been written or dropped.
/// A failing consumer stops the extraction at once, even if the source is
/// still open.
async fn process_zip<S: ChunkSource + ?Sized>(
    extractor: &StreamExtractor,
    source: &mut S,
    cli: Arc<Cli>,
) -> Result<()> {
    let (mut tx, rx) = mpsc::unbounded_channel();
    let mut consumer = tokio::spawn(handle_entries(rx, cli));

    let parsed = {
        let parse = extractor.consume(source, &mut tx);
        tokio::pin!(parse);
        tokio::select! {
            parsed = &mut parse => parsed,
            handled = &mut consumer => {
                handled??;
                // Nothing reads entries any more, parsing only drains the source
                return Ok(parse.await?);
            }
        }
    };
    drop(tx);
    let handled = consumer.await?;

    parsed?;
    handled
}

/// Running totals for the verbose listing.
#[derive(Default)]
struct Totals {
    uncompressed: u64,
    compressed: u64,
    files: usize,
}

async fn handle_entries(mut entries: mpsc::UnboundedReceiver<Entry>, cli: Arc<Cli>) -> Result<()> {
    let listing = cli.list || cli.verbose;
    let mut totals = Totals::default();

    if cli.verbose {
        println!(
            "{:>10}  {:>10}  {:>5}  {:>10}  {:>5}  Name",
            "Length", "Size", "Cmpr", "Date", "Time"
        );
        println!("{}", "-".repeat(70));
    }

    // With a single literal name there is at most one file on stdout
    let show_filename =
        cli.pipe && !(cli.files.len() == 1 && !has_glob_chars(&cli.files[0]));

    while let Some(entry) = entries.recv().await {
        if listing {
            // Dropping the entry discards its content
            list_entry(entry.report(), cli.verbose, &mut totals);
            continue;
        }

        match entry {
            Entry::Directory(report) => {
                if is_selected(&report, &cli) {
                    create_directory(&report, &cli).await?;
                }
            }
            Entry::File(report, content) => {
                if is_selected(&report, &cli) {
                    extract_file(&report, content, &cli, show_filename).await?;
                }
            }
        }
    }

    if cli.verbose {
        println!("{}", "-".repeat(70));
        let total_ratio = if totals.uncompressed > 0 {
            format!(
                "{:>4}%",
                100 - (totals.compressed * 100 / totals.uncompressed) as i64
            )
        } else {
            "  0%".to_string()
        };
        println!(
            "{:>10}  {:>10}  {}  {:>21}  {} files",
            totals.uncompressed, totals.compressed, total_ratio, "", totals.files
        );
    }

    Ok(())
}

/// Print one listing line.
///
/// Streamed entries report the sizes of their local header, which are zero
/// until the data descriptor is reached.
fn list_entry(entry: &EntryReport, verbose: bool, totals: &mut Totals) {
    if !verbose {
        println!("{}", entry.path);
        return;
    }

    let (year, month, day) = entry.mod_date();
    let (hour, minute, _second) = entry.mod_time();

    let ratio = if entry.uncompressed_size > 0 {
        format!(
            "{:>4}%",
            100 - (entry.compressed_size * 100 / entry.uncompressed_size) as i64
        )
    } else {
        "  0%".to_string()
    };

    println!(
        "{:>10}  {:>10}  {}  {:04}-{:02}-{:02}  {:02}:{:02}  {}",
        entry.uncompressed_size,
        entry.compressed_size,
        ratio,
        year,
        month,
        day,
        hour,
        minute,
        entry.path
    );

    if !entry.is_directory() {
        totals.uncompressed += entry.uncompressed_size;
        totals.compressed += entry.compressed_size;
        totals.files += 1;
    }
}

/// Apply the FILES filters and the -x exclusions.
fn is_selected(entry: &EntryReport, cli: &Cli) -> bool {
    if !cli.files.is_empty() {
        let matches = cli.files.iter().any(|f| {
            if has_glob_chars(f) {
                glob_match(f, &entry.path)
            } else {
                let basename = Path::new(&entry.path)
                    .file_name()
                    .map(|s| s.to_string_lossy())
                    .unwrap_or_default();
                entry.path == *f || basename == *f
            }
        });
        if !matches {
            return false;
        }
    }

    !cli
        .exclude
        .iter()
        .any(|x| entry.path.contains(x.as_str()) || glob_match(x, &entry.path))
}

/// Entry paths must stay below the extraction directory.
fn is_safe_path(path: &str) -> bool {
    !path.starts_with('/')
        && !path.starts_with('\\')
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        && !path.split(['/', '\\']).any(|part| part == "..")
}

fn output_path(entry: &EntryReport, cli: &Cli) -> PathBuf {
    let file_name = if cli.junk_paths {
        Path::new(&entry.path)
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| entry.path.clone())
    } else {
        entry.path.clone()
    };

    match cli.extract_dir {
        Some(ref dir) => PathBuf::from(dir).join(file_name),
        None => PathBuf::from(file_name),
    }
}

async fn create_directory(entry: &EntryReport, cli: &Cli) -> Result<()> {
    if cli.pipe || cli.junk_paths {
        return Ok(());
    }
    if !is_safe_path(&entry.path) {
        tracing::warn!(path = %entry.path, "skipping entry with unsafe path");
        return Ok(());
    }

    let path = output_path(entry, cli);
    tokio::fs::create_dir_all(&path).await?;
    if !cli.is_quiet() {
        println!("   creating: {}", entry.path);
    }
    Ok(())
}

/// Extract one file as its content arrives.
///
/// Returning early drops `content`, which tells the extractor to discard the
/// rest of this entry.
async fn extract_file(
    entry: &EntryReport,
    content: EntryStream,
    cli: &Cli,
    show_filename: bool,
) -> Result<()> {
    if !is_safe_path(&entry.path) {
        tracing::warn!(path = %entry.path, "skipping entry with unsafe path");
        return Ok(());
    }
    if entry.is_encrypted() {
        tracing::warn!(path = %entry.path, "skipping encrypted entry");
        return Ok(());
    }
    let mut content = match content.decode(entry.compression_method) {
        Ok(decoded) => decoded,
        Err(Error::UnsupportedCompression(method)) => {
            tracing::warn!(path = %entry.path, method, "skipping entry with unsupported compression");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    // Pipe mode: write file contents directly to stdout
    if cli.pipe {
        let mut stdout = tokio::io::stdout();
        if show_filename {
            stdout
                .write_all(format!("--- {} ---\n", entry.path).as_bytes())
                .await?;
        }
        while let Some(chunk) = content.next_chunk().await {
            stdout.write_all(&chunk?).await?;
        }
        stdout.flush().await?;
        return Ok(());
    }

    let output_path = output_path(entry, cli);

    if output_path.exists() {
        if cli.never_overwrite {
            if !cli.is_quiet() {
                eprintln!("Skipping: {} (file exists)", entry.path);
            }
            return Ok(());
        }

        if !cli.overwrite {
            if !cli.is_quiet() {
                eprintln!("Skipping: {} (use -o to overwrite)", entry.path);
            }
            return Ok(());
        }
    }

    if !cli.is_quiet() {
        println!("  extracting: {}", entry.path);
    }

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let mut file = tokio::fs::File::create(&output_path).await?;
    while let Some(chunk) = content.next_chunk().await {
        file.write_all(&chunk?).await?;
    }
    file.flush().await?;

    Ok(())
}

/// Check if a pattern contains glob wildcard characters.
fn has_glob_chars(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// Glob matching with `*` (any run of characters) and `?` (one character).
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern_chars: Vec<char> = pattern.chars().collect();
    let text_chars: Vec<char> = text.chars().collect();

    fn do_match(pattern: &[char], text: &[char]) -> bool {
        match (pattern.first(), text.first()) {
            (None, None) => true,
            (Some('*'), _) => {
                do_match(&pattern[1..], text) || (!text.is_empty() && do_match(pattern, &text[1..]))
            }
            (Some('?'), Some(_)) => do_match(&pattern[1..], &text[1..]),
            (Some(p), Some(t)) if *p == *t => do_match(&pattern[1..], &text[1..]),
            _ => false,
        }
    }

    do_match(&pattern_chars, &text_chars)
}

/// Format a byte size into a human-readable string.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{LittleEndian, WriteBytesExt};
    use std::time::Duration;
    use streamzip::ChannelSource;

    /// Local header and content of a stored entry, without the central
    /// directory.
    fn stored_entry(name: &str, data: &[u8]) -> Vec<u8> {
        let mut crc = flate2::Crc::new();
        crc.update(data);

        let mut out = Vec::new();
        WriteBytesExt::write_u32::<LittleEndian>(&mut out, 0x04034b50).unwrap();
        WriteBytesExt::write_u16::<LittleEndian>(&mut out, 20).unwrap();
        WriteBytesExt::write_u16::<LittleEndian>(&mut out, 0).unwrap();
        WriteBytesExt::write_u16::<LittleEndian>(&mut out, 0).unwrap();
        WriteBytesExt::write_u16::<LittleEndian>(&mut out, 0).unwrap();
        WriteBytesExt::write_u16::<LittleEndian>(&mut out, 0x21).unwrap();
        WriteBytesExt::write_u32::<LittleEndian>(&mut out, crc.sum()).unwrap();
        WriteBytesExt::write_u32::<LittleEndian>(&mut out, data.len() as u32).unwrap();
        WriteBytesExt::write_u32::<LittleEndian>(&mut out, data.len() as u32).unwrap();
        WriteBytesExt::write_u16::<LittleEndian>(&mut out, name.len() as u16).unwrap();
        WriteBytesExt::write_u16::<LittleEndian>(&mut out, 0).unwrap();
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(data);
        out
    }

    #[test]
    fn globbing() {
        assert!(glob_match("*.txt", "readme.txt"));
        assert!(glob_match("file?.dat", "file1.dat"));
        assert!(!glob_match("*.txt", "readme.md"));
    }

    #[test]
    fn unsafe_paths() {
        assert!(is_safe_path("dir/file.txt"));
        assert!(is_safe_path("./file.txt"));
        assert!(!is_safe_path("../escape"));
        assert!(!is_safe_path("a/../../escape"));
        assert!(!is_safe_path("/etc/passwd"));
        assert!(!is_safe_path("..\\escape"));
    }

    #[test]
    fn sizes() {
        assert_eq!(format_size(500), "500 bytes");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(1048576), "1.00 MB");
    }

    #[tokio::test]
    async fn consumer_failure_stops_an_open_source() {
        // A regular file cannot be the parent of extracted entries
        let blocker = tempfile::NamedTempFile::new().unwrap();
        let dir = blocker.path().to_string_lossy().to_string();
        let cli = Arc::new(Cli::parse_from(["streamzip", "-qq", "-d", &dir, "-"]));

        let (tx, mut source) = ChannelSource::new(4);
        tx.send(Ok(stored_entry("a.txt", b"hello"))).await.unwrap();

        let extractor = StreamExtractor::new();
        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            process_zip(&extractor, &mut source, cli),
        )
        .await
        .expect("consumer error was not reported while the source is open");
        assert!(outcome.is_err());
        assert!(!extractor.is_running());
        drop(tx);
    }
}
