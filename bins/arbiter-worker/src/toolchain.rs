// Language toolchains for the Arbiter worker
//
// Every language is described in config/languages.json by an optional compile
// command and a run command. Arguments are templates: `{source}`, `{artifact}`
// and `{workdir}` are substituted with paths inside the submission workspace.
use crate::runner::CommandLine;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Name of the source file inside the workspace, without extension
pub const SOURCE_STEM: &str = "main";
/// Name of the compiled artifact inside the workspace
pub const ARTIFACT_NAME: &str = "main.bin";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTemplate {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandTemplate {
    pub fn new(command: &str, args: &[&str]) -> Self {
        Self {
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn render(&self, source: &Path, artifact: &Path) -> CommandLine {
        let workdir = source.parent().unwrap_or_else(|| Path::new("."));
        let fill = |template: &str| {
            template
                .replace("{source}", &source.display().to_string())
                .replace("{artifact}", &artifact.display().to_string())
                .replace("{workdir}", &workdir.display().to_string())
        };
        CommandLine::new(fill(&self.command), self.args.iter().map(|a| fill(a)).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageConfig {
    pub name: String,
    pub file_extension: String,
    #[serde(default)]
    pub compile: Option<CommandTemplate>,
    pub run: CommandTemplate,
}

/// Capabilities the judging engine needs from a language
pub trait Toolchain {
    fn needs_compile(&self) -> bool;
    fn source_file_name(&self) -> String;
    fn compile_command(&self, source: &Path, artifact: &Path) -> Option<CommandLine>;
    /// Interpreted languages point this at the source, compiled ones at the artifact
    fn run_command(&self, source: &Path, artifact: &Path) -> CommandLine;
}

impl Toolchain for LanguageConfig {
    fn needs_compile(&self) -> bool {
        self.compile.is_some()
    }

    fn source_file_name(&self) -> String {
        format!("{}.{}", SOURCE_STEM, self.file_extension)
    }

    fn compile_command(&self, source: &Path, artifact: &Path) -> Option<CommandLine> {
        self.compile.as_ref().map(|c| c.render(source, artifact))
    }

    fn run_command(&self, source: &Path, artifact: &Path) -> CommandLine {
        self.run.render(source, artifact)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LanguagesJson {
    languages: Vec<LanguageConfig>,
}

/// Registry of the languages this worker can judge
#[derive(Debug, Clone)]
pub struct ToolchainRegistry {
    languages: HashMap<String, LanguageConfig>,
}

impl ToolchainRegistry {
    pub fn from_languages(languages: Vec<LanguageConfig>) -> Result<Self> {
        let mut map = HashMap::new();
        for lang in languages {
            if lang.name.trim().is_empty() || lang.file_extension.trim().is_empty() {
                bail!("Language entries need a name and a file extension");
            }
            if lang.run.command.trim().is_empty() {
                bail!("Language '{}' has an empty run command", lang.name);
            }
            let name = lang.name.clone();
            if map.insert(name.clone(), lang).is_some() {
                bail!("Language '{}' is declared twice", name);
            }
        }
        if map.is_empty() {
            bail!("No languages configured");
        }
        Ok(Self { languages: map })
    }

    /// Load language configurations from a languages.json file
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Language config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path).context("Failed to read languages.json")?;
        let languages_json: LanguagesJson =
            serde_json::from_str(&content).context("Failed to parse languages.json")?;

        Self::from_languages(languages_json.languages)
    }

    /// Load from `config_path` when it exists, otherwise use the built-in table
    pub fn load_or_builtin(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            Self::load(config_path)
        } else {
            tracing::warn!(
                path = %config_path.display(),
                "Language config not found, using built-in toolchains"
            );
            Ok(Self::builtin())
        }
    }

    /// C++ compiled with optimisation and libm, Python run by the interpreter
    pub fn builtin() -> Self {
        let cpp = LanguageConfig {
            name: "cpp".to_string(),
            file_extension: "cpp".to_string(),
            compile: Some(CommandTemplate::new(
                "g++",
                &["{source}", "-o", "{artifact}", "-std=c++17", "-O2", "-lm"],
            )),
            run: CommandTemplate::new("{artifact}", &[]),
        };
        let python = LanguageConfig {
            name: "python".to_string(),
            file_extension: "py".to_string(),
            compile: None,
            run: CommandTemplate::new("python3", &["{source}"]),
        };
        let languages = [cpp, python]
            .into_iter()
            .map(|l| (l.name.clone(), l))
            .collect();
        Self { languages }
    }

    /// Look up a language tag. Unknown tags are a configuration error.
    pub fn get(&self, language: &str) -> Result<&LanguageConfig> {
        self.languages
            .get(language)
            .ok_or_else(|| anyhow::anyhow!("unsupported language: {}", language))
    }

    /// List all supported languages
    pub fn list_languages(&self) -> Vec<String> {
        let mut names: Vec<String> = self.languages.keys().cloned().collect();
        names.sort();
        names
    }
}
