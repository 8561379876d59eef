use std::{
    fs,
    path::{Path, PathBuf},
};

use {
    anyhow::Context,
    heicbot_config::HeicbotConfig,
    heicbot_media::{
        HeicDecoder, PipelineOptions, RunWorkspace, default_decoder, process_archive,
        split::join_parts,
    },
    tracing::warn,
};

/// Run the conversion pipeline on a local archive and move the result files
/// into `output_dir` (default: `storage.output_dir`).
pub async fn handle_convert(
    config: HeicbotConfig,
    archive: PathBuf,
    output_dir: Option<PathBuf>,
    max_part_size_mb: Option<u64>,
) -> anyhow::Result<()> {
    let output_dir = output_dir.unwrap_or(config.storage.output_dir);
    let options = PipelineOptions {
        archive_name: config.conversion.archive_name,
        max_part_size_mb: max_part_size_mb.unwrap_or(config.conversion.max_part_size_mb),
    };
    let decoder = default_decoder();

    let files = tokio::task::spawn_blocking(move || {
        convert_local(&archive, &output_dir, &*decoder, &options)
    })
    .await??;

    match files.as_slice() {
        [] => println!("No HEIC images found."),
        [single] => println!("Wrote {}", single.display()),
        parts => {
            println!("Wrote {} parts (concatenate in order to rebuild the ZIP):", parts.len());
            for part in parts {
                println!("  {}", part.display());
            }
        },
    }
    Ok(())
}

/// Concatenate split parts back into one archive.
pub fn handle_join(parts: &[PathBuf], output: &Path) -> anyhow::Result<()> {
    let bytes = join_parts(parts, output)?;
    println!("Wrote {} ({bytes} bytes)", output.display());
    Ok(())
}

/// Scratch directories live inside `output_dir` so finished files can be
/// renamed out of them.
fn convert_local(
    archive: &Path,
    output_dir: &Path,
    decoder: &dyn HeicDecoder,
    options: &PipelineOptions,
) -> anyhow::Result<Vec<PathBuf>> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;
    let workspace = RunWorkspace::create(output_dir, output_dir)?;
    let output = process_archive(archive, &workspace, decoder, options)?;

    let mut files = Vec::with_capacity(output.parts.len());
    for part in &output.parts {
        let Some(name) = part.file_name() else {
            continue;
        };
        let dest = output_dir.join(name);
        fs::rename(part, &dest)
            .with_context(|| format!("failed to move {} to {}", part.display(), dest.display()))?;
        files.push(dest);
    }

    if let Err(e) = workspace.close() {
        warn!(error = %e, "failed to remove scratch directories");
    }
    Ok(files)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, heicbot_media::DecodedImage, std::io::Write};

    struct StripeDecoder;

    impl HeicDecoder for StripeDecoder {
        fn decode(&self, _path: &Path) -> heicbot_media::Result<DecodedImage> {
            Ok(DecodedImage {
                width: 2,
                height: 1,
                mode: heicbot_media::PixelMode::Rgb8,
                data: vec![255, 0, 0, 0, 0, 255],
            })
        }
    }

    fn write_zip(path: &Path, names: &[&str]) {
        let mut writer = zip::ZipWriter::new(fs::File::create(path).unwrap());
        for name in names {
            writer
                .start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(b"data").unwrap();
        }
        writer.finish().unwrap();
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn convert_local_moves_archive_and_cleans_scratch() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("photos.zip");
        write_zip(&input, &["a.heic", "b.txt"]);
        let out = dir.path().join("out");

        let files =
            convert_local(&input, &out, &StripeDecoder, &PipelineOptions::default()).unwrap();

        assert_eq!(files, vec![out.join("converted_images.zip")]);
        assert_eq!(entries(&out), vec!["converted_images.zip"]);
    }

    #[test]
    fn convert_local_without_heic_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("photos.zip");
        write_zip(&input, &["b.txt"]);
        let out = dir.path().join("out");

        let files =
            convert_local(&input, &out, &StripeDecoder, &PipelineOptions::default()).unwrap();

        assert!(files.is_empty());
        assert!(entries(&out).is_empty());
    }

    #[test]
    fn join_restores_concatenation() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a_part1.zip");
        let second = dir.path().join("a_part2.zip");
        fs::write(&first, b"hello ").unwrap();
        fs::write(&second, b"world").unwrap();
        let output = dir.path().join("a.zip");

        handle_join(&[first, second], &output).unwrap();

        assert_eq!(fs::read(&output).unwrap(), b"hello world");
    }
}
