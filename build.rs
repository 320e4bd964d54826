use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// Directories holding the project's own Rust sources.
const SOURCE_DIRS: [&str; 6] = ["engine", "cohort", "willingness", "cli", "tests", "benches"];

// A source rule enforced at build time.
struct Rule {
    pattern: &'static str,
    description: &'static str,
    advice: &'static str,
    // Re-checks a matching line with comments and string literals removed.
    code_check: Option<fn(&str) -> bool>,
}

const RULES: [Rule; 2] = [
    Rule {
        pattern: r"\b(_[a-zA-Z0-9_]+)\b",
        description: "underscore-prefixed variables",
        advice: "Either use the variable (removing the underscore) or remove it completely.",
        code_check: Some(has_underscore_identifier),
    },
    Rule {
        pattern: r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]",
        description: "#[allow(dead_code)] attributes",
        advice: "Either use the code (removing the attribute) or remove it completely.",
        code_check: None,
    },
];

// Collects every matching line of one file for a single rule.
struct ViolationCollector<'a> {
    rule: &'a Rule,
    violations: Vec<String>,
    file_path: PathBuf,
}

impl<'a> ViolationCollector<'a> {
    fn new(rule: &'a Rule, file_path: &Path) -> Self {
        Self {
            rule,
            violations: Vec::new(),
            file_path: file_path.to_path_buf(),
        }
    }

    fn check_and_get_error_message(&self) -> Option<String> {
        if self.violations.is_empty() {
            return None;
        }

        let file_name = self.file_path.to_str().unwrap_or("?");
        let mut error_msg = format!(
            "\n❌ ERROR: Found {} {} in {}:\n",
            self.violations.len(),
            self.rule.description,
            file_name
        );
        for violation in &self.violations {
            error_msg.push_str(&format!("   {violation}\n"));
        }
        error_msg.push_str(&format!(
            "\n⚠️ {} are not allowed in this project.\n   {}\n",
            self.rule.description, self.rule.advice
        ));

        Some(error_msg)
    }
}

// The line with string literal contents and any trailing line comment removed.
fn code_portion(line_text: &str) -> String {
    let mut code = String::new();
    // Even-indexed parts of a quote split sit outside string literals.
    for (i, part) in line_text.split('"').enumerate() {
        if i % 2 == 1 {
            code.push('"');
            continue;
        }
        if let Some(comment) = part.find("//") {
            code.push_str(&part[..comment]);
            break;
        }
        code.push_str(part);
    }
    code
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

// Same shape as the underscore rule's pattern, applied to code only.
fn has_underscore_identifier(line_text: &str) -> bool {
    let chars: Vec<char> = code_portion(line_text).chars().collect();
    chars.iter().enumerate().any(|(i, &c)| {
        c == '_'
            && (i == 0 || !is_ident_char(chars[i - 1]))
            && chars.get(i + 1).is_some_and(|&next| is_ident_char(next))
    })
}

impl Sink for ViolationCollector<'_> {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();

        if let Some(in_code) = self.rule.code_check {
            if !in_code(line_text) {
                return Ok(true);
            }
        }

        self.violations.push(format!("{line_number}:{line_text}"));
        Ok(true)
    }
}

fn project_sources() -> Vec<PathBuf> {
    SOURCE_DIRS
        .iter()
        .flat_map(|dir| WalkDir::new(dir).into_iter().filter_map(|e| e.ok()))
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|e| e.into_path())
        .collect()
}

fn scan(rule: &Rule, sources: &[PathBuf]) -> Result<(), Box<dyn Error>> {
    let matcher = RegexMatcher::new_line_matcher(rule.pattern)?;
    let mut searcher = Searcher::new();

    for path in sources {
        let mut collector = ViolationCollector::new(rule, path);
        searcher.search_path(&matcher, path, &mut collector)?;
        if let Some(error_message) = collector.check_and_get_error_message() {
            return Err(error_message.into());
        }
    }
    Ok(())
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for dir in SOURCE_DIRS {
        println!("cargo:rerun-if-changed={dir}");
    }

    let sources = project_sources();
    for rule in &RULES {
        if let Err(e) = scan(rule, &sources) {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
