use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const TESSDATA_REPO: &str = "https://github.com/tesseract-ocr/tessdata/raw/main";

/// Returns the directory for storing our own Tesseract data
pub fn get_tesseract_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("table-scout")
        .join("tesseract")
}

/// Splits a Tesseract language spec ("chi_sim+jpn") into its parts.
pub fn split_languages(spec: &str) -> Vec<&str> {
    spec.split('+')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect()
}

fn has_languages(dir: &Path, languages: &[&str]) -> bool {
    languages
        .iter()
        .all(|lang| dir.join(format!("{}.traineddata", lang)).exists())
}

/// Directories that may hold traineddata files, in lookup order.
fn tessdata_candidates() -> Vec<PathBuf> {
    let mut candidates = vec![get_tesseract_dir().join("tessdata")];

    if let Ok(prefix) = std::env::var("TESSDATA_PREFIX") {
        let prefix = PathBuf::from(prefix);
        candidates.push(prefix.join("tessdata"));
        candidates.push(prefix);
    }

    candidates.extend(
        [
            r"C:\Program Files\Tesseract-OCR\tessdata",
            r"C:\Program Files (x86)\Tesseract-OCR\tessdata",
            "/usr/share/tesseract-ocr/5/tessdata",
            "/usr/share/tesseract-ocr/4.00/tessdata",
            "/usr/share/tessdata",
            "/usr/local/share/tessdata",
            "/opt/homebrew/share/tessdata",
        ]
        .iter()
        .map(PathBuf::from),
    );

    candidates
}

/// Finds the Tesseract executable, checking our local dir first, then PATH,
/// then the default Windows install locations.
pub fn find_tesseract_executable() -> Result<PathBuf> {
    let local_exe = get_tesseract_dir().join(if cfg!(windows) {
        "tesseract.exe"
    } else {
        "tesseract"
    });
    if local_exe.exists() {
        return Ok(local_exe);
    }

    if let Ok(output) = std::process::Command::new("tesseract")
        .arg("--version")
        .output()
    {
        if output.status.success() {
            return Ok(PathBuf::from("tesseract"));
        }
    }

    let common_paths = [
        r"C:\Program Files\Tesseract-OCR\tesseract.exe",
        r"C:\Program Files (x86)\Tesseract-OCR\tesseract.exe",
    ];
    for path in &common_paths {
        let p = PathBuf::from(path);
        if p.exists() {
            return Ok(p);
        }
    }

    Err(anyhow!("Tesseract not found. Please install Tesseract-OCR."))
}

/// Finds a tessdata directory holding every language in `language_spec`.
pub fn find_tessdata_dir(language_spec: &str) -> Result<PathBuf> {
    let languages = split_languages(language_spec);
    tessdata_candidates()
        .into_iter()
        .find(|dir| has_languages(dir, &languages))
        .ok_or_else(|| {
            anyhow!(
                "No tessdata directory contains all of: {}",
                languages.join(", ")
            )
        })
}

/// Ensures traineddata for every language in the given specs is available.
///
/// Missing languages are copied from a system install when one exists, and
/// downloaded from the tessdata repository otherwise. Everything ends up in
/// our local tessdata dir so one `--tessdata-dir` serves all recognizers.
pub fn ensure_languages(language_specs: &[&str]) -> Result<PathBuf> {
    find_tesseract_executable()?;

    let tessdata_dir = get_tesseract_dir().join("tessdata");
    fs::create_dir_all(&tessdata_dir)
        .with_context(|| format!("Failed to create {}", tessdata_dir.display()))?;

    for spec in language_specs {
        for lang in split_languages(spec) {
            let target = tessdata_dir.join(format!("{}.traineddata", lang));
            if target.exists() {
                continue;
            }

            let system_copy = tessdata_candidates()
                .into_iter()
                .skip(1)
                .map(|dir| dir.join(format!("{}.traineddata", lang)))
                .find(|p| p.exists());

            match system_copy {
                Some(source) => {
                    log::info!("Copying {}.traineddata from: {}", lang, source.display());
                    fs::copy(&source, &target)?;
                }
                None => download_traineddata(lang, &target)?,
            }
        }
    }

    log::info!("Tesseract data ready at: {}", tessdata_dir.display());
    Ok(tessdata_dir)
}

/// Downloads one traineddata file from the tessdata repository.
fn download_traineddata(lang: &str, target: &Path) -> Result<()> {
    let url = format!("{}/{}.traineddata", TESSDATA_REPO, lang);
    log::info!("Downloading {}.traineddata...", lang);

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(300))
        .build()?;

    let response = client
        .get(&url)
        .header("User-Agent", "table-scout")
        .send()?;

    if !response.status().is_success() {
        return Err(anyhow!(
            "Failed to download {}.traineddata: HTTP {}",
            lang,
            response.status()
        ));
    }

    let bytes = response.bytes()?;
    fs::write(target, &bytes)
        .with_context(|| format!("Failed to write {}", target.display()))?;

    log::info!("Downloaded {}.traineddata ({} bytes)", lang, bytes.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_split_languages() {
        assert_eq!(split_languages("eng"), vec!["eng"]);
        assert_eq!(
            split_languages("chi_sim+jpn + kor"),
            vec!["chi_sim", "jpn", "kor"]
        );
        assert!(split_languages("").is_empty());
    }

    #[test]
    fn test_has_languages_requires_all() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("eng.traineddata"), b"x").unwrap();

        assert!(has_languages(dir.path(), &["eng"]));
        assert!(!has_languages(dir.path(), &["eng", "jpn"]));
    }
}
