//! Engine configuration
//!
//! Parsed once at startup from a comma-separated option string, the way
//! the host runtime passes interpreter options through its command line:
//! `"jit=MyNamespace.Hot,trace=1,dump=all"`.

use crate::error::{EngineError, EngineResult};

/// Which transformed methods get dumped after transformation.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum DumpFilter {
    /// No dumps.
    #[default]
    None,
    /// Dump every transformed method.
    All,
    /// Dump methods matching `Class::Method` (or a bare class name).
    Selected(Vec<String>),
}

/// Startup options.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Classes whose methods prefer jit-call over interpretation when a
    /// compiled entry is installed.
    pub jit_classes: Vec<String>,
    /// Dispatch tracing level (0 = off, 1 = calls, 2 = every opcode).
    pub trace: u8,
    /// Transformed-method dump selection.
    pub dump: DumpFilter,
}

impl EngineConfig {
    /// Parse a comma-separated option string. Unknown keys are rejected.
    pub fn parse(options: &str) -> EngineResult<Self> {
        let mut config = EngineConfig::default();
        for part in options.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (key, value) = match part.split_once('=') {
                Some(kv) => kv,
                None => (part, ""),
            };
            match key {
                "jit" => {
                    if value.is_empty() {
                        return Err(EngineError::Config("jit= requires a class name".into()));
                    }
                    config.jit_classes.push(value.to_string());
                }
                "trace" => {
                    config.trace = value
                        .parse()
                        .map_err(|_| EngineError::Config(format!("bad trace level '{value}'")))?;
                }
                "dump" => {
                    config.dump = match value {
                        "all" => DumpFilter::All,
                        "" => {
                            return Err(EngineError::Config("dump= requires a selection".into()))
                        }
                        sel => {
                            let prev = std::mem::take(&mut config.dump);
                            match prev {
                                DumpFilter::Selected(mut list) => {
                                    list.push(sel.to_string());
                                    DumpFilter::Selected(list)
                                }
                                _ => DumpFilter::Selected(vec![sel.to_string()]),
                            }
                        }
                    };
                }
                other => {
                    return Err(EngineError::Config(format!("unknown option '{other}'")));
                }
            }
        }
        Ok(config)
    }

    /// Whether methods of `class_name` should prefer an installed
    /// jit-call entry.
    pub fn prefers_jit(&self, class_name: &str) -> bool {
        self.jit_classes.iter().any(|c| c == class_name)
    }

    /// Whether a transformed method should be dumped.
    pub fn should_dump(&self, class_name: &str, method_name: &str) -> bool {
        match &self.dump {
            DumpFilter::None => false,
            DumpFilter::All => true,
            DumpFilter::Selected(list) => list.iter().any(|sel| {
                sel == class_name
                    || sel
                        .split_once("::")
                        .is_some_and(|(c, m)| c == class_name && m == method_name)
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_option_string() {
        let config = EngineConfig::parse("jit=Benchmarks.Hot,trace=2,dump=all").unwrap();
        assert!(config.prefers_jit("Benchmarks.Hot"));
        assert!(!config.prefers_jit("Benchmarks.Cold"));
        assert_eq!(config.trace, 2);
        assert_eq!(config.dump, DumpFilter::All);
    }

    #[test]
    fn dump_selection_by_class_and_method() {
        let config = EngineConfig::parse("dump=Foo::Bar,dump=Baz").unwrap();
        assert!(config.should_dump("Foo", "Bar"));
        assert!(!config.should_dump("Foo", "Other"));
        assert!(config.should_dump("Baz", "Anything"));
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(EngineConfig::parse("gc=server").is_err());
        assert!(EngineConfig::parse("trace=verbose").is_err());
    }

    #[test]
    fn empty_string_is_default() {
        let config = EngineConfig::parse("").unwrap();
        assert_eq!(config.trace, 0);
        assert!(config.jit_classes.is_empty());
    }
}
