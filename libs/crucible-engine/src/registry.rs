// Language launch recipes.
//
// The registry is the authoritative source for which languages are enabled
// and how each one is compiled and run inside the sandbox. All commands
// reference `/code`, the path at which the per-job workspace is mounted
// into the container.

use std::collections::HashMap;

use crate::error::ExecError;

/// Immutable launch recipe for one supported language.
#[derive(Debug, Clone, Copy)]
pub struct LanguageSpec {
    pub tag: &'static str,
    /// Fixed name the source file is written under inside the workspace.
    pub filename: &'static str,
    /// Compile step, absent for interpreted languages.
    pub compile: Option<&'static str>,
    /// Bare run command; reads the program's stdin.
    pub run: &'static str,
}

impl LanguageSpec {
    /// Shell fragment for the single-input path. Standard input arrives via
    /// the `INPUT` environment variable set on the container.
    pub fn shell_command(&self) -> String {
        match self.compile {
            Some(compile) => format!("{compile} && echo \"$INPUT\" | {}", self.run),
            None => format!("echo \"$INPUT\" | {}", self.run),
        }
    }
}

const LANGUAGES: &[LanguageSpec] = &[
    LanguageSpec {
        tag: "python",
        filename: "main.py",
        compile: None,
        run: "python3 /code/main.py",
    },
    LanguageSpec {
        tag: "javascript",
        filename: "main.js",
        compile: None,
        run: "node /code/main.js",
    },
    LanguageSpec {
        tag: "go",
        filename: "main.go",
        compile: None,
        run: "go run /code/main.go",
    },
    LanguageSpec {
        tag: "c",
        filename: "main.c",
        compile: Some("gcc /code/main.c -o /code/a.out"),
        run: "/code/a.out",
    },
    LanguageSpec {
        tag: "cpp",
        filename: "main.cpp",
        compile: Some("g++ /code/main.cpp -o /code/a.out"),
        run: "/code/a.out",
    },
    LanguageSpec {
        tag: "java",
        filename: "Main.java",
        compile: Some("javac /code/Main.java"),
        run: "java -cp /code Main",
    },
];

/// Read-only mapping from language tag to its launch recipe.
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    specs: HashMap<&'static str, LanguageSpec>,
}

impl LanguageRegistry {
    /// Registry over the built-in language set.
    pub fn builtin() -> Self {
        Self {
            specs: LANGUAGES.iter().map(|spec| (spec.tag, *spec)).collect(),
        }
    }

    pub fn get(&self, tag: &str) -> Option<&LanguageSpec> {
        self.specs.get(tag)
    }

    pub fn resolve(&self, tag: &str) -> Result<&LanguageSpec, ExecError> {
        self.get(tag)
            .ok_or_else(|| ExecError::UnsupportedLanguage(tag.to_string()))
    }

    pub fn tags(&self) -> Vec<&'static str> {
        let mut tags: Vec<_> = self.specs.keys().copied().collect();
        tags.sort_unstable();
        tags
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_language_set() {
        let registry = LanguageRegistry::builtin();
        assert_eq!(
            registry.tags(),
            vec!["c", "cpp", "go", "java", "javascript", "python"]
        );
    }

    #[test]
    fn test_unknown_tag_fails() {
        let registry = LanguageRegistry::builtin();
        assert!(registry.get("cobol").is_none());
        assert!(matches!(
            registry.resolve("cobol"),
            Err(ExecError::UnsupportedLanguage(_))
        ));
    }

    #[test]
    fn test_interpreted_command_shape() {
        let registry = LanguageRegistry::builtin();
        let python = registry.get("python").unwrap();
        assert_eq!(python.filename, "main.py");
        assert_eq!(
            python.shell_command(),
            "echo \"$INPUT\" | python3 /code/main.py"
        );
    }

    #[test]
    fn test_compiled_command_shape() {
        let registry = LanguageRegistry::builtin();
        let java = registry.get("java").unwrap();
        assert_eq!(java.filename, "Main.java");
        assert_eq!(
            java.shell_command(),
            "javac /code/Main.java && echo \"$INPUT\" | java -cp /code Main"
        );
        let c = registry.get("c").unwrap();
        assert_eq!(
            c.shell_command(),
            "gcc /code/main.c -o /code/a.out && echo \"$INPUT\" | /code/a.out"
        );
    }
}
