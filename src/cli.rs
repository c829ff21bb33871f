use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use chrono::{Local, NaiveDate};
use clap::{ArgGroup, Parser, Subcommand};
use directories::ProjectDirs;
use log::info;

use crate::cache::Overlays;
use crate::config::Config;
use crate::database::Database;
use crate::error::TtPulseError;
use crate::notify::{LogTransport, StaticRecipients};
use crate::parser::HttpSource;
use crate::service::{ConfigGroups, ScheduleService};
use crate::timetable::{day_name_ru, DaySchedule, Slot, DATE_FMT};
use crate::watch::Watchdog;

#[derive(Parser)]
#[command(
    name = "ttpulse",
    version,
    about = "TtPulse: timetable fetching, caching and update monitoring"
)]
pub struct Cli {
    /// Configuration file (default: platform config directory)
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,

    /// Database file directory (default: platform data directory)
    #[arg(long = "dbpath", short = 'd', global = true)]
    dbpath: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the schedule for a single day
    Day {
        /// Group code as configured under [groups]
        group: String,

        /// Date in dd.mm.yyyy form (default: today)
        #[arg(long = "date", value_parser = parse_date)]
        date: Option<NaiveDate>,
    },

    /// Print the Monday-to-Saturday week view
    Week {
        /// Group code as configured under [groups]
        group: String,

        /// Anchor date in dd.mm.yyyy form (default: today)
        #[arg(long = "date", value_parser = parse_date)]
        date: Option<NaiveDate>,
    },

    /// List the distinct subjects taught during the week
    Subjects {
        /// Group code as configured under [groups]
        group: String,

        /// Anchor date in dd.mm.yyyy form (default: today)
        #[arg(long = "date", value_parser = parse_date)]
        date: Option<NaiveDate>,
    },

    /// Set or clear a manual correction for one day
    #[command(group(ArgGroup::new("action").required(true).args(["pair", "clear"])))]
    Override {
        /// Group code as configured under [groups]
        group: String,

        /// Date in dd.mm.yyyy form
        #[arg(long = "date", value_parser = parse_date)]
        date: NaiveDate,

        /// Pair number to correct (requires --lesson)
        #[arg(long = "pair", requires = "lesson", value_parser = clap::value_parser!(u8).range(1..=8))]
        pair: Option<u8>,

        /// Replacement lesson text, e.g. "Physics | Room 2 | Dr Y". An
        /// empty string blanks the pair.
        #[arg(long = "lesson", requires = "pair")]
        lesson: Option<String>,

        /// Remove the correction for the date
        #[arg(long = "clear", default_value_t = false, conflicts_with_all = ["pair", "lesson"])]
        clear: bool,
    },

    /// Run the update watchdog until interrupted
    Watch,
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, DATE_FMT)
        .map_err(|_| format!("invalid date '{s}': expected dd.mm.yyyy"))
}

fn project_dirs() -> Result<ProjectDirs, TtPulseError> {
    ProjectDirs::from("", "", "ttpulse")
        .ok_or_else(|| TtPulseError::Error("Could not determine home directory".to_string()))
}

impl Cli {
    pub fn handle_command_line() -> Result<(), TtPulseError> {
        let args = Cli::parse();

        let config_path = match &args.config {
            Some(path) => path.clone(),
            None => project_dirs()?.config_dir().join("config.toml"),
        };
        let config = Config::load_config(&config_path);

        // The handle must outlive command dispatch; the logger shuts down
        // when it is dropped.
        let _logger = flexi_logger::Logger::try_with_env_or_str(&config.logging.ttpulse)
            .map_err(|e| TtPulseError::Error(format!("Failed to configure logging: {e}")))?
            .start()
            .map_err(|e| TtPulseError::Error(format!("Failed to start logger: {e}")))?;

        let db_folder = match &args.dbpath {
            Some(path) => path.clone(),
            None => project_dirs()?.data_dir().to_path_buf(),
        };
        let db = Arc::new(Database::open(&db_folder)?);

        match args.command {
            Command::Day { group, date } => {
                let service = Self::build_service(&config, db)?;
                println!("{}", service.get_day_text(&group, date.unwrap_or_else(today)));
                Ok(())
            }
            Command::Week { group, date } => {
                let service = Self::build_service(&config, db)?;
                println!("{}", service.get_week_text(&group, date.unwrap_or_else(today)));
                Ok(())
            }
            Command::Subjects { group, date } => {
                let service = Self::build_service(&config, db)?;
                for subject in service.get_unique_subjects(&group, date.unwrap_or_else(today)) {
                    println!("{subject}");
                }
                Ok(())
            }
            Command::Override {
                group,
                date,
                pair,
                lesson,
                clear,
            } => Self::apply_override(&db, &group, date, pair, lesson, clear),
            Command::Watch => Self::start_watchdog(&config, db),
        }
    }

    fn build_service(config: &Config, db: Arc<Database>) -> Result<ScheduleService, TtPulseError> {
        let source = Arc::new(HttpSource::new(&config.fetch)?);
        let directory = Arc::new(ConfigGroups::new(config.groups.clone()));
        Ok(ScheduleService::new(db, source, directory))
    }

    fn apply_override(
        db: &Database,
        group: &str,
        date: NaiveDate,
        pair: Option<u8>,
        lesson: Option<String>,
        clear: bool,
    ) -> Result<(), TtPulseError> {
        if clear {
            if Overlays::clear(db, group, date)? {
                println!("Removed correction for {group} on {}", date.format(DATE_FMT));
            } else {
                println!("No correction stored for {group} on {}", date.format(DATE_FMT));
            }
            return Ok(());
        }

        // clap guarantees both are present when not clearing
        let (Some(pair), Some(lesson)) = (pair, lesson) else {
            return Err(TtPulseError::Error(
                "override requires --pair with --lesson, or --clear".to_string(),
            ));
        };

        // Corrections merge per pair into any overlay already stored for
        // the date. An empty lesson blanks the pair.
        let mut schedule = Overlays::get(db, group, date)?.unwrap_or_else(|| DaySchedule {
            day_name: day_name_ru(date).to_string(),
            pairs: Default::default(),
        });
        let slot = if lesson.is_empty() {
            Slot::Empty
        } else {
            Slot::Merged(lesson)
        };
        schedule.pairs.insert(pair, slot);
        Overlays::set(db, group, date, &schedule)?;
        println!(
            "Stored correction for {group} on {}, pair {pair}",
            date.format(DATE_FMT)
        );
        Ok(())
    }

    fn start_watchdog(config: &Config, db: Arc<Database>) -> Result<(), TtPulseError> {
        let source = Arc::new(HttpSource::new(&config.fetch)?);
        let directory = Arc::new(ConfigGroups::new(config.groups.clone()));
        let recipients = Arc::new(StaticRecipients::new(config.watch.notify_ids().to_vec()));
        let watchdog = Watchdog::new(
            db,
            source,
            directory,
            recipients,
            Arc::new(LogTransport),
            &config.watch,
        );

        info!("Starting watchdog");

        // The sender stays alive for the life of the process, so the loop
        // only ends when the process is interrupted.
        let (_shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        thread::spawn(move || watchdog.run_loop(shutdown_rx))
            .join()
            .map_err(|_| TtPulseError::Error("Watchdog thread panicked".to_string()))
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_parsing_day_with_date() {
        let result = Cli::try_parse_from(["ttpulse", "day", "CS-101", "--date", "06.05.2024"]);
        assert!(result.is_ok(), "Should accept day with dd.mm.yyyy date");

        let cli = result.unwrap();
        match cli.command {
            Command::Day { group, date } => {
                assert_eq!(group, "CS-101");
                assert_eq!(date, NaiveDate::from_ymd_opt(2024, 5, 6));
            }
            _ => panic!("Expected day command"),
        }
    }

    #[test]
    fn test_cli_parsing_rejects_iso_date() {
        let result = Cli::try_parse_from(["ttpulse", "day", "CS-101", "--date", "2024-05-06"]);
        assert!(result.is_err(), "Should reject non-dd.mm.yyyy dates");
    }

    #[test]
    fn test_cli_parsing_requires_subcommand() {
        let result = Cli::try_parse_from(["ttpulse"]);
        assert!(result.is_err(), "Should require a command");
    }

    #[test]
    fn test_cli_parsing_override_requires_action() {
        let result = Cli::try_parse_from(["ttpulse", "override", "CS-101", "--date", "06.05.2024"]);
        assert!(result.is_err(), "Should require --pair/--lesson or --clear");

        let result = Cli::try_parse_from([
            "ttpulse", "override", "CS-101", "--date", "06.05.2024", "--clear",
        ]);
        assert!(result.is_ok(), "Should accept --clear alone");

        let result = Cli::try_parse_from([
            "ttpulse", "override", "CS-101", "--date", "06.05.2024", "--pair", "3", "--lesson",
            "Physics | Room 2 | Dr Y",
        ]);
        assert!(result.is_ok(), "Should accept --pair with --lesson");

        let result = Cli::try_parse_from([
            "ttpulse", "override", "CS-101", "--date", "06.05.2024", "--pair", "3",
        ]);
        assert!(result.is_err(), "Should reject --pair without --lesson");
    }

    #[test]
    fn test_cli_parsing_override_pair_range() {
        let result = Cli::try_parse_from([
            "ttpulse", "override", "CS-101", "--date", "06.05.2024", "--pair", "9", "--lesson",
            "X",
        ]);
        assert!(result.is_err(), "Should reject pair numbers above 8");
    }

    #[test]
    fn override_merges_pairs_and_blanks_with_empty_lesson() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let d = NaiveDate::from_ymd_opt(2024, 5, 6).unwrap();

        Cli::apply_override(
            &db,
            "CS-101",
            d,
            Some(3),
            Some("Physics | Room 2 | Dr Y".into()),
            false,
        )
        .unwrap();
        Cli::apply_override(&db, "CS-101", d, Some(4), Some(String::new()), false).unwrap();

        let overlay = Overlays::get(&db, "CS-101", d).unwrap().unwrap();
        assert_eq!(overlay.day_name, "Понедельник");
        assert_eq!(
            overlay.pairs[&3],
            Slot::Merged("Physics | Room 2 | Dr Y".into())
        );
        assert_eq!(overlay.pairs[&4], Slot::Empty);
        // A blanked pair carries no canonical text, so the watchdog diff
        // sees it as removed.
        assert_eq!(crate::render::pair_texts(Some(&overlay)).get(&4), None);

        Cli::apply_override(&db, "CS-101", d, None, None, true).unwrap();
        assert_eq!(Overlays::get(&db, "CS-101", d).unwrap(), None);
    }

    #[test]
    fn test_cli_parsing_global_dbpath() {
        let result = Cli::try_parse_from(["ttpulse", "watch", "--dbpath", "/tmp/tt"]);
        assert!(result.is_ok(), "Should accept global --dbpath after the command");

        let cli = result.unwrap();
        assert_eq!(cli.dbpath, Some(PathBuf::from("/tmp/tt")));
        assert!(matches!(cli.command, Command::Watch));
    }
}
