use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use docweave::context::IdGenerator;
use docweave::parser::Parser;
use expander::{DiagnosticError, Engine, ProcessingMode};

use crate::model::models_from_table;

const FENCE: &str = "---";

/// One `[[expect_warnings]]` entry.
#[derive(Debug, Deserialize)]
pub struct ExpectedWarning {
    /// Text the warning message must contain.
    pub contains: String,

    /// 1-based template line the warning must point at.
    #[serde(default)]
    pub line: Option<usize>,
}

/// Frontmatter of a `.test.md` file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    pub description: Option<String>,

    /// throw (default), skip or highlight.
    pub mode: Option<String>,

    /// Root models, bound in file order.
    pub model: toml::map::Map<String, toml::Value>,

    /// Expanded Markdown, compared with surrounding whitespace trimmed.
    pub expect_output: Option<String>,

    /// Text the expansion error must contain.
    pub expect_error: Option<String>,

    /// The template must be rejected before expansion starts.
    pub expect_parse_error: bool,

    /// When present, handled errors must match these, in order.
    pub expect_warnings: Option<Vec<ExpectedWarning>>,
}

/// Split a `.test.md` file into its TOML frontmatter and the template body.
fn parse_test_file(content: &str) -> Result<(TestConfig, &str), String> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut rest = content
        .strip_prefix(FENCE)
        .ok_or("file must start with a --- line")?;
    rest = rest.trim_start_matches('\r').strip_prefix('\n').unwrap_or(rest);

    let mut offset = 0;
    let mut fence = None;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == FENCE {
            fence = Some((offset, offset + line.len()));
            break;
        }
        offset += line.len();
    }
    let (end, body) = fence.ok_or("frontmatter is never closed by a --- line")?;

    let config = toml::from_str(&rest[..end]).map_err(|e| format!("bad frontmatter: {}", e))?;
    Ok((config, &rest[body..]))
}

#[derive(Debug)]
pub enum TestOutcome {
    Pass,
    Fail(String),
}

pub struct TestResult {
    pub path: PathBuf,
    pub description: Option<String>,
    pub outcome: TestOutcome,
}

fn run_single_test(path: &Path) -> TestResult {
    let mut description = None;
    let outcome = match check_file(path, &mut description) {
        Ok(()) => TestOutcome::Pass,
        Err(reason) => TestOutcome::Fail(reason),
    };
    TestResult {
        path: path.to_path_buf(),
        description,
        outcome,
    }
}

/// Run the test in `path`, reporting why it fails.
fn check_file(path: &Path, description: &mut Option<String>) -> Result<(), String> {
    let content =
        std::fs::read_to_string(path).map_err(|e| format!("cannot read file: {}", e))?;
    let (config, source) = parse_test_file(&content)?;
    description.clone_from(&config.description);

    let parser = Parser::new(source.to_string(), 0);
    let parsed = parser.parse(&mut IdGenerator::new());
    if config.expect_parse_error {
        return match parsed {
            Err(_) => Ok(()),
            Ok(_) => Err("template parsed, but a parse error was expected".into()),
        };
    }
    if let (Err(errors), None) = (&parsed, &config.expect_error) {
        let messages: Vec<String> = errors.iter().map(|e| e.message()).collect();
        return Err(format!("template rejected: {}", messages.join("; ")));
    }

    let mode = config
        .mode
        .as_deref()
        .map(str::parse::<ProcessingMode>)
        .transpose()?
        .unwrap_or_default();
    let mut engine = Engine::new(mode);
    for (name, value) in models_from_table(&config.model) {
        engine.bind(name, value);
    }
    let mut document = parser.read();

    let diagnostics = match (engine.process(&mut document), &config.expect_error) {
        (Err(err), Some(wanted)) if err.to_string().contains(wanted.as_str()) => return Ok(()),
        (Err(err), Some(wanted)) => {
            return Err(format!("error should contain \"{}\", got: {}", wanted, err));
        }
        (Err(err), None) => return Err(format!("expansion failed: {}", err)),
        (Ok(_), Some(wanted)) => {
            return Err(format!("expansion succeeded, expected an error containing \"{}\"", wanted));
        }
        (Ok(report), None) => report.diagnostics,
    };

    if let Some(wanted) = &config.expect_output {
        let actual = document.to_string();
        if actual.trim() != wanted.trim() {
            return Err(format!(
                "wrong output\n  expected: {}\n  actual:   {}",
                wanted.trim(),
                actual.trim()
            ));
        }
    }
    match &config.expect_warnings {
        Some(expected) => check_warnings(source, &diagnostics, expected).map_or(Ok(()), Err),
        None => Ok(()),
    }
}

/// 1-based line of a byte offset.
fn line_of(source: &str, offset: usize) -> usize {
    source[..offset.min(source.len())].matches('\n').count() + 1
}

/// Compare handled diagnostics against the expected warnings, in order.
fn check_warnings(
    source: &str,
    diagnostics: &[DiagnosticError],
    expected: &[ExpectedWarning],
) -> Option<String> {
    let warnings: Vec<&DiagnosticError> = diagnostics.iter().filter(|d| d.is_warning).collect();

    if warnings.len() != expected.len() {
        let listed = if warnings.is_empty() {
            "    (none)".to_string()
        } else {
            warnings
                .iter()
                .map(|w| format!("  - {}", w))
                .collect::<Vec<_>>()
                .join("\n")
        };
        return Some(format!(
            "expected {} warning(s), got {}\n  actual warnings:\n{}",
            expected.len(),
            warnings.len(),
            listed
        ));
    }

    for (i, (actual, want)) in warnings.iter().zip(expected).enumerate() {
        let msg = actual.to_string();
        if !msg.contains(&want.contains) {
            return Some(format!(
                "warning[{}]: expected message containing \"{}\", got: {}",
                i, want.contains, msg
            ));
        }
        let Some(line) = want.line else {
            continue;
        };
        match &actual.span {
            Some(span) if line_of(source, span.start) == line => {}
            Some(span) => {
                return Some(format!(
                    "warning[{}]: expected on line {}, but span is on line {}",
                    i,
                    line,
                    line_of(source, span.start)
                ));
            }
            None => {
                return Some(format!(
                    "warning[{}]: expected on line {}, but warning has no span",
                    i, line
                ));
            }
        }
    }

    None
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// `.test.md` files under `root` keyed by sub-folder, sorted. Files directly
/// in `root` (or `root` itself, when it is a file) get the category "".
fn discover(root: &Path) -> BTreeMap<String, Vec<PathBuf>> {
    let mut categories: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    if root.is_file() {
        categories.insert(String::new(), vec![root.to_path_buf()]);
        return categories;
    }
    collect_tests(root, root, &mut categories);
    for files in categories.values_mut() {
        files.sort();
    }
    categories
}

fn collect_tests(dir: &Path, root: &Path, out: &mut BTreeMap<String, Vec<PathBuf>>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_tests(&path, root, out);
            continue;
        }
        let is_test = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(".test.md"));
        if is_test {
            let category = path
                .parent()
                .and_then(|p| p.strip_prefix(root).ok())
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .unwrap_or_default();
            out.entry(category).or_default().push(path);
        }
    }
}

fn category_label(category: &str) -> &str {
    if category.is_empty() { "(root)" } else { category }
}

/// List available categories for the given test path.
pub fn list_categories(path: &Path) {
    if path.is_file() {
        eprintln!("(single file, no categories)");
        return;
    }
    let categories = discover(path);
    if categories.is_empty() {
        eprintln!("no .test.md files found in {}", path.display());
        return;
    }
    eprintln!("available categories:");
    for (category, files) in &categories {
        eprintln!("  {} ({} tests)", category_label(category), files.len());
    }
}

/// Keep the categories named in `wanted` (and their sub-folders).
fn select<'a>(
    all: &'a BTreeMap<String, Vec<PathBuf>>,
    wanted: &[String],
) -> BTreeMap<&'a str, &'a [PathBuf]> {
    if wanted.is_empty() {
        return all.iter().map(|(k, v)| (k.as_str(), v.as_slice())).collect();
    }
    let mut selected = BTreeMap::new();
    for requested in wanted {
        let req = requested.trim_matches('/');
        let prefix = format!("{}/", req);
        let before = selected.len();
        for (category, files) in all {
            if category == req || category.starts_with(&prefix) {
                selected.insert(category.as_str(), files.as_slice());
            }
        }
        if selected.len() == before {
            let available: Vec<&str> = all.keys().map(|k| category_label(k)).collect();
            eprintln!(
                "warning: category '{}' not found (available: {})",
                req,
                available.join(", ")
            );
        }
    }
    selected
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

struct Palette {
    color: bool,
}

impl Palette {
    fn paint(&self, text: &str, code: &str) -> String {
        if self.color {
            format!("\x1b[{}m{}\x1b[0m", code, text)
        } else {
            text.to_string()
        }
    }

    fn pass(&self) -> String {
        self.paint("PASS", "32")
    }

    fn fail(&self) -> String {
        self.paint("FAIL", "31")
    }

    fn bold(&self, text: &str) -> String {
        self.paint(text, "1")
    }
}

/// Run every `.test.md` file under `path` (or the single file `path`),
/// optionally restricted to `categories`. Returns the process exit code.
pub fn run_tests(path: &Path, no_color: bool, categories: &[String]) -> i32 {
    let palette = Palette { color: !no_color };
    let all = discover(path);
    if all.is_empty() {
        eprintln!("no .test.md files found in {}", path.display());
        return 1;
    }
    let selected = select(&all, categories);
    if selected.is_empty() {
        eprintln!("no matching categories found");
        return 1;
    }

    let mut passed = 0usize;
    let mut failures: Vec<TestResult> = Vec::new();

    for (category, files) in &selected {
        if !path.is_file() {
            eprintln!();
            eprintln!("{}", palette.bold(category_label(category)));
        }
        for file in *files {
            let result = run_single_test(file);
            let label = result
                .description
                .clone()
                .or_else(|| file.file_stem().map(|s| s.to_string_lossy().into_owned()))
                .unwrap_or_else(|| "?".to_string());
            match &result.outcome {
                TestOutcome::Pass => {
                    passed += 1;
                    eprintln!("  {}  {}", palette.pass(), label);
                }
                TestOutcome::Fail(_) => {
                    eprintln!("  {}  {}", palette.fail(), label);
                    failures.push(result);
                }
            }
        }
    }

    if !failures.is_empty() {
        eprintln!();
        eprintln!("failures:");
        for f in &failures {
            eprintln!();
            eprintln!("  --- {} ---", f.path.display());
            if let TestOutcome::Fail(reason) = &f.outcome {
                for line in reason.lines() {
                    eprintln!("  {}", line);
                }
            }
        }
    }

    eprintln!();
    if failures.is_empty() {
        eprintln!("test result: {}. {} passed, 0 failed", palette.paint("ok", "32"), passed);
        0
    } else {
        eprintln!(
            "test result: {}. {} passed, {} failed (of {})",
            palette.paint("FAILED", "31"),
            passed,
            failures.len(),
            passed + failures.len()
        );
        1
    }
}
