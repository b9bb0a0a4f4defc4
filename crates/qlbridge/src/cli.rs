//! Command-line interface of the `sigcheck` operator tool.

use crate::sigcheck::ModuleKind;
use clap::error::ErrorKind;
use clap::{Arg, ArgAction, Command};
use std::ffi::OsString;
use std::path::PathBuf;

/// Arguments of `sigcheck`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    /// Server binary or game module to scan
    pub image: PathBuf,
    pub module: ModuleKind,
    /// Print the report as JSON
    pub json: bool,
    /// Bridge configuration supplying the offset fallback table
    pub config: Option<PathBuf>,
}

fn command() -> Command {
    Command::new("sigcheck")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Checks qlbridge function signatures against a Quake Live binary")
        .arg(
            Arg::new("image")
                .short('i')
                .long("image")
                .value_name("FILE")
                .help("Binary image to scan (qzeroded.x64 or qagamex64.so)")
                .value_parser(clap::value_parser!(PathBuf))
                .required(true),
        )
        .arg(
            Arg::new("module")
                .short('m')
                .long("module")
                .value_name("MODULE")
                .help("Which function table to check")
                .value_parser(["engine", "game"])
                .default_value("engine"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Output the report as JSON")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("qlbridge.toml whose [hooks.offsets] are used as fallback")
                .value_parser(clap::value_parser!(PathBuf)),
        )
}

impl CliArgs {
    /// Parses the process arguments, exiting with usage on error.
    pub fn parse() -> Self {
        Self::try_parse_from(std::env::args_os()).unwrap_or_else(|e| e.exit())
    }

    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let mut command = command();
        let matches = command.try_get_matches_from_mut(args)?;

        let image = matches
            .get_one::<PathBuf>("image")
            .cloned()
            .ok_or_else(|| command.error(ErrorKind::MissingRequiredArgument, "--image is required"))?;
        let module = matches
            .get_one::<String>("module")
            .map(|m| m.parse::<ModuleKind>())
            .transpose()
            .map_err(|e| command.error(ErrorKind::InvalidValue, e))?
            .unwrap_or(ModuleKind::Engine);

        Ok(Self {
            image,
            module,
            json: matches.get_flag("json"),
            config: matches.get_one::<PathBuf>("config").cloned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_the_engine_table() {
        let args = CliArgs::try_parse_from(["sigcheck", "--image", "qzeroded.x64"]).unwrap();
        assert_eq!(args.image, PathBuf::from("qzeroded.x64"));
        assert_eq!(args.module, ModuleKind::Engine);
        assert!(!args.json);
        assert_eq!(args.config, None);
    }

    #[test]
    fn all_options() {
        let args = CliArgs::try_parse_from([
            "sigcheck", "-i", "qagamex64.so", "-m", "game", "--json", "-c", "qlbridge.toml",
        ])
        .unwrap();
        assert_eq!(args.module, ModuleKind::Game);
        assert!(args.json);
        assert_eq!(args.config, Some(PathBuf::from("qlbridge.toml")));
    }

    #[test]
    fn image_is_required_and_module_is_checked() {
        assert!(CliArgs::try_parse_from(["sigcheck"]).is_err());
        assert!(CliArgs::try_parse_from(["sigcheck", "-i", "x", "-m", "cgame"]).is_err());
    }
}
