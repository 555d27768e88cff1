use crate::error::{TrainingError, TrainingResult};
use crate::exemplars::{validate_set, Exemplar, ExemplarSet};
use std::path::Path;

/// Upper bound on lines read from a training or validation file.
pub const MAX_EXEMPLAR_LINES: usize = 1000;

pub fn read_exemplar_set(path: &Path) -> TrainingResult<ExemplarSet> {
    let contents = std::fs::read_to_string(path)?;
    let set: ExemplarSet = serde_json::from_str(&contents).map_err(|e| {
        TrainingError::InvalidSet(format!("failed to parse {}: {}", path.display(), e))
    })?;
    validate_set(&set)?;
    Ok(set)
}

pub fn write_exemplar_set(path: &Path, set: &ExemplarSet) -> TrainingResult<()> {
    validate_set(set)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut out = serde_json::to_string_pretty(set)?;
    out.push('\n');
    std::fs::write(path, out)?;
    Ok(())
}

/// Reads one exemplar per line. Blank lines are skipped.
pub fn read_exemplars_jsonl(path: &Path) -> TrainingResult<Vec<Exemplar>> {
    let contents = std::fs::read_to_string(path)?;
    let mut exemplars = Vec::new();

    for (idx, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let ex: Exemplar = serde_json::from_str(line).map_err(|e| {
            TrainingError::Dataset(format!("failed to parse jsonl line {}: {}", idx + 1, e))
        })?;
        exemplars.push(ex);
        if exemplars.len() >= MAX_EXEMPLAR_LINES {
            break;
        }
    }

    if exemplars.is_empty() {
        return Err(TrainingError::Dataset(format!("{} contains no exemplars", path.display())));
    }
    Ok(exemplars)
}

pub fn write_exemplars_jsonl(path: &Path, exemplars: &[Exemplar]) -> TrainingResult<()> {
    let mut out = String::new();
    for ex in exemplars {
        out.push_str(&serde_json::to_string(ex)?);
        out.push('\n');
    }
    std::fs::write(path, out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_survives_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sets").join("baseline.json");
        let set = ExemplarSet::baseline();

        write_exemplar_set(&path, &set).unwrap();
        let loaded = read_exemplar_set(&path).unwrap();

        assert_eq!(loaded.id().unwrap(), set.id().unwrap());
    }

    #[test]
    fn test_jsonl_skips_blank_lines_and_reports_bad_line() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("train.jsonl");
        std::fs::write(
            &good,
            "{\"question\": \"total revenue\", \"sql\": \"SELECT 1\"}\n\n{\"question\": \"orders in 1997\"}\n",
        )
        .unwrap();
        let exemplars = read_exemplars_jsonl(&good).unwrap();
        assert_eq!(exemplars.len(), 2);
        assert!(exemplars[1].sql.is_empty());

        let bad = dir.path().join("bad.jsonl");
        std::fs::write(&bad, "{\"question\": \"ok\"}\nnot json\n").unwrap();
        let err = read_exemplars_jsonl(&bad).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_empty_jsonl_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.jsonl");
        std::fs::write(&path, "\n").unwrap();
        assert!(read_exemplars_jsonl(&path).is_err());
    }
}
