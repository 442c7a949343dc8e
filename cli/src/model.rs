use std::path::{Path, PathBuf};

use serde::Deserialize;

use expander::{ProcessingMode, Value};

/// Optional `docweave.toml` settings. Command-line flags win over these.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// `throw`, `skip` or `highlight`.
    #[serde(default)]
    pub mode: Option<String>,

    /// Model file used when `-m` is not given, relative to the config file.
    #[serde(default)]
    pub model: Option<PathBuf>,

    /// Output file used when `-o` is not given, relative to the config file.
    #[serde(default)]
    pub output: Option<PathBuf>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;
        let mut config: Config =
            toml::from_str(&text).map_err(|e| format!("{}: {}", path.display(), e))?;

        let base = path.parent().unwrap_or(Path::new("."));
        config.model = config.model.map(|p| base.join(p));
        config.output = config.output.map(|p| base.join(p));
        Ok(config)
    }

    pub fn mode(&self) -> Result<Option<ProcessingMode>, String> {
        self.mode.as_deref().map(str::parse).transpose()
    }
}

/// Convert a TOML value into a model value. Datetimes become strings.
pub fn toml_to_value(val: &toml::Value) -> Value {
    match val {
        toml::Value::Integer(n) => Value::Number(*n as f64),
        toml::Value::Float(f) => Value::Number(*f),
        toml::Value::Boolean(b) => Value::Bool(*b),
        toml::Value::String(s) => Value::String(s.clone()),
        toml::Value::Array(items) => Value::List(items.iter().map(toml_to_value).collect()),
        toml::Value::Table(table) => table_to_value(table),
        other => Value::String(other.to_string()),
    }
}

/// A table with exactly `headers` (strings) and `rows` (arrays) is a
/// dynamic table value; any other table is a map.
fn table_to_value(table: &toml::map::Map<String, toml::Value>) -> Value {
    if table.len() == 2 {
        if let (Some(toml::Value::Array(headers)), Some(toml::Value::Array(rows))) =
            (table.get("headers"), table.get("rows"))
        {
            let headers: Option<Vec<String>> = headers
                .iter()
                .map(|h| h.as_str().map(str::to_string))
                .collect();
            let rows: Option<Vec<Vec<Value>>> = rows
                .iter()
                .map(|r| {
                    r.as_array()
                        .map(|cells| cells.iter().map(toml_to_value).collect())
                })
                .collect();
            if let (Some(headers), Some(rows)) = (headers, rows) {
                return Value::Table { headers, rows };
            }
        }
    }
    Value::Map(
        table
            .iter()
            .map(|(k, v)| (k.clone(), toml_to_value(v)))
            .collect(),
    )
}

/// Root models from a TOML table, in file order.
pub fn models_from_table(table: &toml::map::Map<String, toml::Value>) -> Vec<(String, Value)> {
    table
        .iter()
        .map(|(k, v)| (k.clone(), toml_to_value(v)))
        .collect()
}

/// Read a model file. Every top-level key is a root model.
pub fn load_models(path: &Path) -> Result<Vec<(String, Value)>, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;
    let table: toml::map::Map<String, toml::Value> =
        toml::from_str(&text).map_err(|e| format!("{}: {}", path.display(), e))?;
    Ok(models_from_table(&table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn top_level_keys_keep_file_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[invoice]\nnumber = 7\nlines = [{{ sku = \"A1\" }}]\n\n[company]\nname = \"Acme\""
        )
        .unwrap();

        let models = load_models(file.path()).unwrap();
        let names: Vec<&str> = models.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["invoice", "company"]);
        assert_eq!(
            models[0].1.member("number"),
            Some(Value::Number(7.0))
        );
        assert!(matches!(models[0].1.member("lines"), Some(Value::List(l)) if l.len() == 1));
    }

    #[test]
    fn headers_and_rows_make_a_table() {
        let table: toml::map::Map<String, toml::Value> =
            toml::from_str("[grid]\nheaders = [\"A\", \"B\"]\nrows = [[1, 2], [3]]").unwrap();
        let models = models_from_table(&table);
        match &models[0].1 {
            Value::Table { headers, rows } => {
                assert_eq!(headers, &vec!["A".to_string(), "B".to_string()]);
                assert_eq!(rows.len(), 2);
            }
            other => panic!("expected a table, got {:?}", other),
        }
    }

    #[test]
    fn config_paths_are_relative_to_the_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docweave.toml");
        std::fs::write(&path, "mode = \"skip\"\nmodel = \"data.toml\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.mode().unwrap(), Some(ProcessingMode::SkipAndRemove));
        assert_eq!(config.model, Some(dir.path().join("data.toml")));
        assert_eq!(config.output, None);
    }

    #[test]
    fn bad_mode_is_reported() {
        let config = Config {
            mode: Some("loud".into()),
            ..Config::default()
        };
        assert!(config.mode().unwrap_err().contains("loud"));
    }
}
