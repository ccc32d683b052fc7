use std::error::Error;
use std::io::{self, stdin, stdout, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use strum::IntoEnumIterator;
use tokio::task::JoinHandle;

use rom_cover_finder::names::NameDatabase;
use rom_cover_finder::opt::*;
use rom_cover_finder::roms;
use rom_cover_finder::{
    calculate_similarity, Algorithm, MatchOptions, QueryTracker, Settings, SimilarityResult,
};

fn log(s: String) {
    log_if(s.as_str(), DbgFlg::Cli);
}

pub struct Session {
    settings: Settings,
    settings_path: PathBuf,
    names: Option<NameDatabase>,
    queries: Arc<QueryTracker>,
}

impl Session {
    pub fn new(settings: Settings, settings_path: PathBuf) -> Self {
        let names = settings.name_database_path.clone().map(NameDatabase::new);
        Session {
            settings,
            settings_path,
            names,
            queries: Arc::new(QueryTracker::new()),
        }
    }

    fn image_folder(&self, matches: &ArgMatches) -> Res<PathBuf> {
        matches
            .get_one::<String>("folder")
            .map(PathBuf::from)
            .or_else(|| self.settings.image_folder.clone())
            .ok_or_else(|| "error: No image folder. Use --folder or `set images <path>`".to_string())
    }

    fn resolve_name(&self, name: &str) -> Res<String> {
        match &self.names {
            Some(names) => names.display_name_for(name),
            None => Err("error: No name database. Use `set names <path>`".to_string()),
        }
    }

    async fn query(
        &self,
        target: &str,
        folder: &Path,
        threshold: f64,
        algorithm: &str,
    ) -> Result<Option<SimilarityResult>, Box<dyn Error>> {
        let gate = self.queries.begin();
        let options = MatchOptions::from(&self.settings);
        let result =
            calculate_similarity(target, folder, threshold, algorithm, &gate, &options).await;
        self.queries.finish(&gate);

        let result = result?;
        if gate.is_cancelled() {
            return Ok(None);
        }
        Ok(Some(result))
    }
}

// Ctrl-C cancels the running query, or exits when the prompt is idle.
fn watch_interrupts(queries: Arc<QueryTracker>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if queries.cancel_current() {
                log("Interrupted, cancelling query".to_string());
                continue;
            }
            let _ = writeln!(stdout(), "\nExiting ...");
            let _ = stdout().flush();
            std::process::exit(130);
        }
    })
}

pub async fn main(session: &mut Session) -> Result<(), Box<dyn Error>> {
    let interrupts = watch_interrupts(session.queries.clone());

    loop {
        let line = match readline()? {
            Some(line) => line,
            None => {
                writeln!(stdout())?;
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match respond(session, line).await {
            Ok(quit) => {
                if quit {
                    break;
                }
            }
            Err(err) => {
                writeln!(stdout(), "{err}")?;
                stdout().flush()?;
            }
        }
    }

    interrupts.abort();
    Ok(())
}

async fn respond(session: &mut Session, line: &str) -> Result<bool, Box<dyn Error>> {
    let args = shlex::split(line).ok_or("error: Invalid quoting")?;
    let matches = cli().try_get_matches_from(args)?;
    match matches.subcommand() {
        Some(("ping", _matches)) => {
            writeln!(stdout(), "Pong")?;
        }
        Some(("quit", _matches)) => {
            writeln!(stdout(), "Exiting ...")?;
            stdout().flush()?;
            return Ok(true);
        }
        Some(("find", matches)) => find(session, matches).await?,
        Some(("batch", matches)) => batch(session, matches).await?,
        Some(("mame", matches)) => {
            let short_name = required(matches, "name")?;
            match &session.names {
                Some(names) => match names.resolve(&short_name)? {
                    Some(title) => writeln!(stdout(), "{} -> {}", short_name, title)?,
                    None => writeln!(stdout(), "{} is not in {}", short_name, names.path().display())?,
                },
                None => writeln!(stdout(), "error: No name database. Use `set names <path>`")?,
            }
        }
        Some(("set", matches)) => {
            let key = required(matches, "key")?;
            let value = matches
                .get_one::<String>("value")
                .cloned()
                .unwrap_or_default();
            session.settings.set(&key, &value)?;
            if key == "names" {
                session.names = session
                    .settings
                    .name_database_path
                    .clone()
                    .map(NameDatabase::new);
            }
            session.settings.save(&session.settings_path)?;
            log(format!("Saved settings to {}", session.settings_path.display()));
        }
        Some(("settings", _matches)) => {
            writeln!(stdout(), "{}", serde_json::to_string_pretty(&session.settings)?)?;
        }
        Some(("algorithms", _matches)) => {
            for algorithm in Algorithm::iter() {
                let marker = if algorithm.to_string() == session.settings.algorithm {
                    "*"
                } else {
                    " "
                };
                writeln!(stdout(), "{} {}", marker, algorithm)?;
            }
        }
        Some((name, _matches)) => return Err(format!("error: Invalid command {}", name).into()),
        None => unreachable!("subcommand required"),
    }
    stdout().flush()?;

    Ok(false)
}

fn required(matches: &ArgMatches, id: &str) -> Res<String> {
    matches
        .get_one::<String>(id)
        .cloned()
        .ok_or_else(|| format!("error: missing <{}>", id))
}

fn query_settings(session: &Session, matches: &ArgMatches) -> (f64, String) {
    let threshold = matches
        .get_one::<f64>("threshold")
        .copied()
        .unwrap_or(session.settings.sanitized().similarity_threshold);
    let algorithm = matches
        .get_one::<String>("algorithm")
        .cloned()
        .unwrap_or_else(|| session.settings.algorithm.clone());
    (threshold, algorithm)
}

async fn find(session: &Session, matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let target = matches
        .get_many::<String>("target")
        .map(|words| words.cloned().collect::<Vec<_>>().join(" "))
        .ok_or("error: missing <target>")?;
    let folder = session.image_folder(matches)?;
    let (threshold, algorithm) = query_settings(session, matches);

    let search_name = if matches.get_flag("mame") {
        session.resolve_name(&target)?
    } else {
        target.clone()
    };
    log(format!(
        "Searching {} for \"{}\" ({}, threshold {})",
        folder.display(),
        search_name,
        algorithm,
        threshold
    ));

    let result = match session
        .query(&search_name, &folder, threshold, &algorithm)
        .await?
    {
        Some(result) => result,
        None => {
            writeln!(stdout(), "Cancelled.")?;
            return Ok(());
        }
    };

    if result.ranked_images.is_empty() {
        writeln!(stdout(), "No matching images found.")?;
    }
    for (idx, image) in result.ranked_images.iter().enumerate() {
        writeln!(stdout(), "{:<3} {}", idx + 1, image)?;
    }
    for err in result.processing_errors.iter() {
        writeln!(stdout(), "  ! {}", err)?;
    }

    if let Some(out_dir) = matches.get_one::<String>("export") {
        match result.best().and_then(|best| best.image.as_ref()) {
            Some(image) => {
                let path = roms::export_image(image, Path::new(out_dir), &target)?;
                writeln!(stdout(), "Exported {}", path.display())?;
            }
            None => writeln!(stdout(), "Nothing to export.")?,
        }
    }

    Ok(())
}

async fn batch(session: &Session, matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let rom_folder = matches
        .get_one::<String>("roms")
        .map(PathBuf::from)
        .or_else(|| session.settings.rom_folder.clone())
        .ok_or("error: No ROM folder. Use --roms or `set roms <path>`")?;
    let folder = session.image_folder(matches)?;
    let (threshold, algorithm) = query_settings(session, matches);
    let out_dir = matches.get_one::<String>("export").map(PathBuf::from);
    let use_names = matches.get_flag("mame");

    let rom_paths = roms::list_roms(&rom_folder, &session.settings.supported_extensions)?;
    writeln!(stdout(), "Found {} ROMs in {}", rom_paths.len(), rom_folder.display())?;

    for rom_path in rom_paths.iter() {
        let rom_name = match roms::rom_name(rom_path) {
            Some(name) => name,
            None => {
                writeln!(stdout(), "  ! skipping {}", rom_path.display())?;
                continue;
            }
        };
        let search_name = if use_names {
            session.resolve_name(&rom_name)?
        } else {
            rom_name.clone()
        };

        let result = match session
            .query(&search_name, &folder, threshold, &algorithm)
            .await?
        {
            Some(result) => result,
            None => {
                writeln!(stdout(), "Cancelled.")?;
                return Ok(());
            }
        };

        match result.best() {
            Some(best) => {
                writeln!(stdout(), "{:30} -> {}", rom_name, best)?;
                if let (Some(out_dir), Some(image)) = (out_dir.as_ref(), best.image.as_ref()) {
                    roms::export_image(image, out_dir, &rom_name)?;
                }
            }
            None => writeln!(stdout(), "{:30} -> no match", rom_name)?,
        }
        for err in result.processing_errors.iter() {
            writeln!(stdout(), "  ! {}", err)?;
        }
        stdout().flush()?;
    }

    Ok(())
}

fn query_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("folder")
            .long("folder")
            .short('f')
            .help("Folder with candidate images"),
    )
    .arg(
        Arg::new("threshold")
            .long("threshold")
            .short('t')
            .value_parser(value_parser!(f64))
            .help("Minimum similarity score (0-100)"),
    )
    .arg(
        Arg::new("algorithm")
            .long("algorithm")
            .short('a')
            .help("Similarity algorithm name"),
    )
    .arg(
        Arg::new("mame")
            .long("mame")
            .action(ArgAction::SetTrue)
            .help("Translate short names through the name database"),
    )
    .arg(
        Arg::new("export")
            .long("export")
            .short('o')
            .help("Write the best match as <name>.png into this folder"),
    )
}

fn cli() -> Command {
    // strip out usage
    const PARSER_TEMPLATE: &str = "\
        {all-args}
    ";
    // strip out name/version
    const COMMAND_TEMPLATE: &str = "\
        {about-with-newline}\n\
        {usage-heading}\n    {usage}\n\
        \n\
        {all-args}{after-help}\
    ";

    Command::new("repl")
        .multicall(true)
        .arg_required_else_help(true)
        .subcommand_required(true)
        .subcommand_value_name("COMMAND")
        .subcommand_help_heading("COMMANDS")
        .help_template(PARSER_TEMPLATE)
        .subcommand(
            Command::new("ping")
                .about("Get a response")
                .help_template(COMMAND_TEMPLATE),
        )
        .subcommand(
            Command::new("quit")
                .alias("exit")
                .alias("q")
                .alias(":q")
                .about("Quit the REPL")
                .help_template(COMMAND_TEMPLATE),
        )
        .subcommand(query_args(
            Command::new("find")
                .about("Rank the images matching a name")
                .arg(Arg::new("target").required(true).num_args(1..))
                .help_template(COMMAND_TEMPLATE),
        ))
        .subcommand(query_args(
            Command::new("batch")
                .about("Find the best image for every ROM in a folder")
                .arg(Arg::new("roms").long("roms").short('r').help("Folder with ROMs"))
                .help_template(COMMAND_TEMPLATE),
        ))
        .subcommand(
            Command::new("mame")
                .about("Look up the title of an arcade short name")
                .arg(Arg::new("name").required(true))
                .help_template(COMMAND_TEMPLATE),
        )
        .subcommand(
            Command::new("set")
                .about("Change a setting: images, roms, names, threshold, algorithm, max-images, retries, retry-delay, concurrency, extensions")
                .arg(Arg::new("key").required(true))
                .arg(Arg::new("value"))
                .help_template(COMMAND_TEMPLATE),
        )
        .subcommand(
            Command::new("settings")
                .about("Show the current settings")
                .help_template(COMMAND_TEMPLATE),
        )
        .subcommand(
            Command::new("algorithms")
                .about("List the similarity algorithms")
                .help_template(COMMAND_TEMPLATE),
        )
}

// None once the input is closed.
fn read_command(input: &mut impl BufRead) -> io::Result<Option<String>> {
    let mut buffer = String::new();
    match input.read_line(&mut buffer)? {
        0 => Ok(None),
        _ => Ok(Some(buffer)),
    }
}

fn readline() -> Result<Option<String>, Box<dyn Error>> {
    write!(stdout(), "> ")?;
    stdout().flush()?;
    Ok(read_command(&mut stdin().lock())?)
}
