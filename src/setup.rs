//! Parse input configuration file

use std::fmt;
use std::path::Path;

use meval::Context;
use thiserror::Error;
use yaml_rust::{yaml::Yaml, YamlLoader};

use crate::constants::*;

const HELP_MSG: &str = "Usage: mpirun -n np ./field-access input-file";

#[derive(Error, Debug, Clone)]
pub enum InputError {
    #[error("invalid input file: {0}\n{}", HELP_MSG)]
    InvalidInputFile(&'static str),
    #[error("unable to parse '{0}' = '{1}' in configuration file")]
    CouldNotParse(String, String),
    #[error("unable to find '{1}' in section '{0}' with correct type in configuration file")]
    MissingField(String, String),
    #[error("'{1}' in section '{0}' must be given together with '{2}'")]
    Unpaired(String, String, String),
}

/// Represents the input configuration, can be queried
/// for desired parameters
pub struct Configuration<'a> {
    input: Yaml,
    ctx: Context<'a>,
}

impl<'a> Configuration<'a> {
    pub fn from_file(path: &Path) -> Result<Self, InputError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|_| InputError::InvalidInputFile("unable to read file"))?;
        Self::from_string(&contents)
    }

    pub fn from_string(contents: &str) -> Result<Self, InputError> {
        let input = YamlLoader::load_from_str(contents)
            .map_err(|_| InputError::InvalidInputFile("yaml trouble"))?;
        let input = input.first().ok_or(InputError::InvalidInputFile("yaml trouble"))?;
        Ok(Configuration {
            input: input.clone(),
            ctx: Context::new(),
        })
    }

    /// Seeds the expression context with physical constants and helper
    /// functions, then adds the values defined in `section`, if present.
    pub fn with_context(&mut self, section: &str) -> &mut Self {
        self.ctx
            .var("me", ELECTRON_MASS)
            .var("mp", PROTON_MASS)
            .var("c", SPEED_OF_LIGHT)
            .var("e", ELEMENTARY_CHARGE)
            .var("eps0", VACUUM_PERMITTIVITY)
            .var("mu0", VACUUM_PERMEABILITY)
            .var("kB", BOLTZMANN_CONSTANT)
            .var("eV", ELEMENTARY_CHARGE)
            .var("keV", 1.0e3 * ELEMENTARY_CHARGE)
            .var("MeV", 1.0e6 * ELEMENTARY_CHARGE)
            .var("femto", 1.0e-15)
            .var("pico", 1.0e-12)
            .var("nano", 1.0e-9)
            .var("micro", 1.0e-6)
            .var("milli", 1.0e-3)
            .func3("step", |x, min, max| if x >= min && x < max {1.0} else {0.0})
            .func3("gauss", |x, mu, sigma| (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp())
            .func("critical", |omega| VACUUM_PERMITTIVITY * ELECTRON_MASS * omega.powi(2) / ELEMENTARY_CHARGE.powi(2));

        // constants may refer to those defined above them
        if let Some(hash) = self.input[section].as_hash() {
            for (a, b) in hash {
                match (a, b) {
                    (Yaml::String(s), Yaml::Real(v)) => {
                        if let Ok(num) = v.parse::<f64>() {self.ctx.var(s, num);}
                    },
                    (Yaml::String(s), Yaml::Integer(i)) => {
                        self.ctx.var(s, *i as f64);
                    },
                    (Yaml::String(s), Yaml::String(v)) => {
                        if let Ok(expr) = v.parse::<meval::Expr>() {
                            if let Ok(num) = expr.eval_with_context(&self.ctx) {self.ctx.var(s, num);}
                        }
                    },
                    _ => ()
                }
            }
        }

        self
    }

    fn evaluate(&self, field: &str, y: &Yaml) -> Option<Result<f64, InputError>> {
        let parse_err = |s: &str| InputError::CouldNotParse(field.to_owned(), s.to_owned());
        match y {
            Yaml::Real(s) => Some(s.parse::<f64>().map_err(|_| parse_err(s))),
            Yaml::Integer(i) => Some(Ok(*i as f64)),
            Yaml::String(s) => {
                let value = s.parse::<meval::Expr>()
                    .map_err(|_| parse_err(s))
                    .and_then(|expr| expr.eval_with_context(&self.ctx).map_err(|_| parse_err(s)));
                Some(value)
            },
            _ => None,
        }
    }

    /// Whether `section` has an entry called `field`, of whatever type.
    pub fn contains(&self, section: &str, field: &str) -> bool {
        !self.input[section][field].is_badvalue()
    }

    /// Reads an entry that may be left out: `Ok(None)` if it is absent,
    /// otherwise whatever `get` makes of it, errors included.
    pub fn optional<T, F>(&self, section: &str, field: &str, get: F) -> Result<Option<T>, InputError>
    where
        F: FnOnce(&Self, &str, &str) -> Result<T, InputError>,
    {
        if self.contains(section, field) {
            get(self, section, field).map(Some)
        } else {
            Ok(None)
        }
    }

    /// The error for an entry that is absent, or present with the wrong type.
    fn wrong_type(&self, section: &str, field: &str) -> InputError {
        match &self.input[section][field] {
            Yaml::BadValue => InputError::MissingField(section.to_owned(), field.to_owned()),
            y => InputError::CouldNotParse(field.to_owned(), describe(y)),
        }
    }

    pub fn real(&self, section: &str, field: &str) -> Result<f64, InputError> {
        self.evaluate(field, &self.input[section][field])
            .unwrap_or_else(|| Err(self.wrong_type(section, field)))
    }

    /// A list of numbers or expressions. A single value is read as a
    /// list of one.
    pub fn reals(&self, section: &str, field: &str) -> Result<Vec<f64>, InputError> {
        match &self.input[section][field] {
            Yaml::Array(array) => array
                .iter()
                .map(|y| {
                    self.evaluate(field, y)
                        .unwrap_or_else(|| Err(InputError::CouldNotParse(field.to_owned(), describe(y))))
                })
                .collect(),
            y => self.evaluate(field, y)
                .map(|v| v.map(|v| vec![v]))
                .unwrap_or_else(|| Err(self.wrong_type(section, field))),
        }
    }

    pub fn func3(&'a self, section: &str, field: &str, args: [&str; 3]) -> Result<impl Fn(f64, f64, f64) -> f64 + 'a, InputError> {
        let s = match &self.input[section][field] {
            Yaml::String(s) | Yaml::Real(s) => s.clone(),
            Yaml::Integer(i) => i.to_string(),
            _ => return Err(InputError::MissingField(section.to_owned(), field.to_owned())),
        };
        let expr = s.parse::<meval::Expr>().map_err(|_| InputError::CouldNotParse(field.to_owned(), s.clone()))?;
        expr.bind3_with_context(&self.ctx, args[0], args[1], args[2]).map_err(|_| InputError::CouldNotParse(field.to_owned(), s.clone()))
    }

    pub fn integer(&self, section: &str, field: &str) -> Result<i64, InputError> {
        match &self.input[section][field] {
            Yaml::Integer(i) => Ok(*i),
            _ => Err(self.wrong_type(section, field)),
        }
    }

    pub fn integers(&self, section: &str, field: &str) -> Result<Vec<i64>, InputError> {
        match &self.input[section][field] {
            Yaml::Integer(i) => Ok(vec![*i]),
            Yaml::Array(array) => array
                .iter()
                .map(|y| y.as_i64().ok_or_else(|| InputError::CouldNotParse(field.to_owned(), describe(y))))
                .collect(),
            _ => Err(self.wrong_type(section, field)),
        }
    }

    pub fn bool(&self, section: &str, field: &str) -> Result<bool, InputError> {
        match &self.input[section][field] {
            Yaml::Boolean(b) => Ok(*b),
            _ => Err(self.wrong_type(section, field)),
        }
    }

    pub fn strings(&self, section: &str, field: &str) -> Result<Vec<String>, InputError> {
        let name = field.to_owned();
        match &self.input[section][field] {
            Yaml::String(s) => {
                Ok(vec![s.clone()])
            },
            Yaml::Array(array) => {
                let got: Vec<String> = array.iter().filter_map(|y| y.as_str().map(str::to_owned)).collect();
                if got.is_empty() {
                    Err(InputError::CouldNotParse(section.to_owned(), name))
                } else {
                    Ok(got)
                }
            },
            _ => Err(InputError::MissingField(section.to_owned(), name))
        }
    }

    pub fn string(&self, section: &str, field: &str) -> Result<String, InputError> {
        let mut strs = self.strings(section, field)?;
        Ok(strs.swap_remove(0))
    }

    /// Names of the entries of `section`, in file order.
    pub fn keys(&self, section: &str) -> Result<Vec<String>, InputError> {
        let hash = match &self.input[section] {
            Yaml::Hash(hash) => hash,
            Yaml::BadValue => return Err(InputError::MissingField(section.to_owned(), "*".to_owned())),
            y => return Err(InputError::CouldNotParse(section.to_owned(), describe(y))),
        };
        Ok(hash.keys().filter_map(|k| k.as_str().map(str::to_owned)).collect())
    }
}

fn describe(y: &Yaml) -> String {
    match y {
        Yaml::Real(s) | Yaml::String(s) => s.clone(),
        Yaml::Integer(i) => i.to_string(),
        Yaml::Boolean(b) => b.to_string(),
        other => format!("{:?}", other),
    }
}

pub struct PrettyDuration {
    pub duration: std::time::Duration,
}

impl From<std::time::Duration> for PrettyDuration {
    fn from(duration: std::time::Duration) -> PrettyDuration {
        PrettyDuration { duration }
    }
}

impl fmt::Display for PrettyDuration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut t = self.duration.as_secs();
        let s = t % 60;
        t /= 60;
        let min = t % 60;
        t /= 60;
        let hr = t % 24;
        let d = t / 24;
        if d > 0 {
            write!(f, "{}d {:02}:{:02}:{:02}", d, hr, min, s)
        } else {
            write!(f, "{:02}:{:02}:{:02}.{:03}", hr, min, s, self.duration.subsec_millis())
        }
    }
}
