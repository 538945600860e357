mod parse;

use crate::parse::{AdminCommand, Args, Command, LogArgs, SpeciesCommand};
use chrono::{Local, NaiveDate};
use clap::Parser;
use fieldlog::{
    ApiClient, ClientConfig, ClientError, DetailsForm, EnvLocation, FileCredentialStore,
    LocationCapture, NewSpecies, PhotoRef, QuestionKind, SessionManager, SpeciesChoice,
    SpeciesLog, SubmissionFlow, default_store_path, util,
};
use log::{error, info, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

fn require_login(sessions: &SessionManager) -> fieldlog::Result<()> {
    if !sessions.is_authenticated() {
        return Err(ClientError::Validation(
            "Not logged in; run `fieldlog login` first".to_string(),
        ));
    }
    Ok(())
}

fn require_admin(sessions: &SessionManager) -> fieldlog::Result<()> {
    require_login(sessions)?;
    if !sessions.is_admin() {
        return Err(ClientError::Validation("Admin access required".to_string()));
    }
    Ok(())
}

fn describe_kind(kind: &QuestionKind) -> String {
    match kind {
        QuestionKind::MultipleChoice(options) => format!("one of: {}", options.join(" | ")),
        QuestionKind::Text => "text".to_string(),
        QuestionKind::Number => "number".to_string(),
        QuestionKind::YesNo => "yes/no".to_string(),
    }
}

fn print_log(log: &SpeciesLog) {
    println!(
        "#{:<5} {:<24} {:<20} {}",
        log.id,
        log.species_name.as_deref().unwrap_or("Unknown"),
        log.location_name.as_deref().unwrap_or("N/A"),
        log.created_at.as_deref().unwrap_or("")
    );
}

#[derive(Debug, PartialEq)]
struct Summary<'a> {
    total: usize,
    unique_species: usize,
    date_range: Option<(&'a str, &'a str)>,
    top_locations: Vec<(&'a str, usize)>,
}

fn summarize(logs: &[SpeciesLog]) -> Option<Summary<'_>> {
    if logs.is_empty() {
        return None;
    }

    let unique_species: std::collections::HashSet<String> = logs
        .iter()
        .filter_map(|log| {
            log.species_name
                .clone()
                .or_else(|| log.species_id.map(|id| id.to_string()))
        })
        .filter(|name| !name.is_empty())
        .collect();

    // Get date range
    let dates: Vec<&str> = logs
        .iter()
        .filter_map(|log| log.created_at.as_deref())
        .map(|date| date.get(..10).unwrap_or(date))
        .filter(|date| !date.is_empty())
        .collect();
    let date_range = dates.iter().min().zip(dates.iter().max()).map(|(a, b)| (*a, *b));

    // Top locations
    let mut location_counts: HashMap<&str, usize> = HashMap::new();
    for log in logs {
        if let Some(location) = log.location_name.as_deref().filter(|l| !l.is_empty()) {
            *location_counts.entry(location).or_insert(0) += 1;
        }
    }
    let mut top_locations: Vec<_> = location_counts.into_iter().collect();
    top_locations.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    top_locations.truncate(3);

    Some(Summary {
        total: logs.len(),
        unique_species: unique_species.len(),
        date_range,
        top_locations,
    })
}

pub fn print_summary(logs: &[SpeciesLog]) {
    let Some(summary) = summarize(logs) else {
        println!("No observations yet");
        return;
    };

    println!("\nSummary:");
    println!("Total observations: {}", summary.total);
    println!("Unique species: {}", summary.unique_species);
    if let Some((min_date, max_date)) = summary.date_range {
        println!("Date range: {} to {}", min_date, max_date);
    }
    println!("Top locations:");
    for (location, count) in &summary.top_locations {
        println!("  {}: {}", location, count);
    }
}

fn save_history(logs: &[SpeciesLog], output: &Path) -> fieldlog::Result<()> {
    util::save_to_csv(logs, output).map_err(|e| {
        ClientError::Io(std::io::Error::other(format!(
            "could not save CSV to {}: {e}",
            output.display()
        )))
    })
}

/// Saves the export as received. The row count is informational, so a
/// document the csv reader rejects is still kept on disk.
fn save_export(
    dir: &Path,
    csv: &str,
    date: NaiveDate,
) -> fieldlog::Result<(PathBuf, Option<usize>)> {
    let path = util::write_export(dir, csv, date)?;
    let rows = match util::csv_row_count(csv) {
        Ok(rows) => Some(rows),
        Err(e) => {
            warn!("Export saved to {} but could not be parsed as CSV: {}", path.display(), e);
            None
        }
    };
    Ok((path, rows))
}

async fn log_observation(client: &ApiClient, args: LogArgs) -> fieldlog::Result<()> {
    let mut flow = SubmissionFlow::load(client).await?;

    let species = match args.new_species {
        Some(name) => SpeciesChoice::New(NewSpecies {
            name,
            scientific_name: args.scientific_name,
            category: args.category,
            description: String::new(),
        }),
        None => SpeciesChoice::Existing(args.species_id),
    };
    let mut form = DetailsForm {
        species,
        location_name: args.location,
        latitude: args.latitude,
        longitude: args.longitude,
        notes: args.notes,
        photo: args.photo.map(PhotoRef::new),
    };
    if args.locate {
        let capture = LocationCapture::new(EnvLocation);
        form.apply_fix(capture.request().await?);
    }
    if let Some(details) = flow.details_form_mut() {
        *details = form;
    }

    let details = flow.submit_details(client).await?;
    println!(
        "Species #{} at {} ({:.5}, {:.5})",
        details.species_id,
        details.location.name,
        details.location.latitude,
        details.location.longitude
    );

    for (question_id, raw) in &args.answers {
        flow.answer_raw(*question_id, raw)?;
    }
    let unanswered = flow.unanswered();
    if !unanswered.is_empty() {
        println!("Unanswered questions (pass them with -a ID=VALUE):");
        for question in unanswered {
            println!(
                "  [{}] {} ({})",
                question.id,
                question.text,
                describe_kind(&question.kind)
            );
        }
    }

    let spinner = util::spinner("Submitting observation...");
    let submitted = flow.submit(client).await;
    spinner.finish_and_clear();
    match submitted? {
        Some(log) => println!("Observation #{} logged successfully!", log.id),
        None => println!("Observation logged successfully!"),
    }
    Ok(())
}

async fn run(sessions: &mut SessionManager, command: Command) -> fieldlog::Result<()> {
    match command {
        Command::Login { username, password } => {
            let session = sessions.login(&username, &password).await?;
            println!("Logged in as {}", session.user.username);
        }
        Command::Register {
            username,
            email,
            password,
            admin_secret,
        } => {
            sessions
                .register(&username, &email, &password, admin_secret.as_deref())
                .await?;
            println!("Account created successfully! Please login.");
        }
        Command::Logout => {
            sessions.logout()?;
            println!("Logged out");
        }
        Command::Whoami => {
            require_login(sessions)?;
            let (user, stats) = sessions.client().dashboard().await?;
            let user = sessions.update_user(user)?;
            println!(
                "{}{}",
                user.username,
                if user.is_admin { " (admin)" } else { "" }
            );
            println!("Observations: {}", stats.total_logs);
            println!("Species observed: {}", stats.unique_species);
        }
        Command::Species { action } => {
            require_login(sessions)?;
            let client = sessions.client();
            match action {
                SpeciesCommand::List => {
                    let species = client.get_species().await?;
                    let thumbnails = client.species_thumbnails().await.unwrap_or_else(|e| {
                        error!("Could not load species images: {}", e);
                        HashMap::new()
                    });
                    for s in &species {
                        println!(
                            "#{:<5} {:<24} {:<28} {:<12} {}",
                            s.id,
                            s.name,
                            s.scientific_name.as_deref().unwrap_or(""),
                            s.category.as_deref().unwrap_or(""),
                            thumbnails.get(&s.id).map(String::as_str).unwrap_or("")
                        );
                    }
                    info!("Listed {} species", species.len());
                }
                SpeciesCommand::Add {
                    name,
                    scientific_name,
                    category,
                    description,
                } => {
                    let created = client
                        .create_species(&NewSpecies {
                            name,
                            scientific_name,
                            category,
                            description,
                        })
                        .await?;
                    println!("Created species #{} {}", created.id, created.name);
                }
            }
        }
        Command::Questions => {
            require_login(sessions)?;
            for question in sessions.client().get_questions().await? {
                println!(
                    "[{}] {} ({})",
                    question.id,
                    question.text,
                    describe_kind(&question.kind)
                );
            }
        }
        Command::Log(args) => {
            require_login(sessions)?;
            log_observation(sessions.client(), args).await?;
        }
        Command::History { output } => {
            require_login(sessions)?;
            let logs = sessions.client().get_species_logs().await?;
            logs.iter().for_each(print_log);
            print_summary(&logs);
            if let Some(output) = output {
                save_history(&logs, &output)?;
                println!("Saved {} observations to {}", logs.len(), output.display());
            }
        }
        Command::Show { id } => {
            require_login(sessions)?;
            let log = sessions.client().get_species_log(id).await?;
            println!("Species: {}", log.species_name.as_deref().unwrap_or("Unknown"));
            println!("Location: {}", log.location_name.as_deref().unwrap_or("N/A"));
            if let (Some(lat), Some(lon)) = (log.latitude, log.longitude) {
                println!("Coordinates: {:.5}, {:.5}", lat, lon);
            }
            println!("Date: {}", log.created_at.as_deref().unwrap_or(""));
            if let Some(notes) = log.notes.as_deref().filter(|n| !n.is_empty()) {
                println!("Notes: {}", notes);
            }
            if let Some(photo) = &log.photo_path {
                println!("Photo: {}", photo);
            }
            println!("Answers:");
            for answer in &log.answers {
                let value = match &answer.answer_text {
                    Some(serde_json::Value::String(text)) => text.clone(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                };
                println!(
                    "  - {}: {}",
                    answer.question_text.as_deref().unwrap_or("?"),
                    value
                );
            }
        }
        Command::Admin { action } => {
            require_admin(sessions)?;
            let client = sessions.client();
            match action {
                AdminCommand::Users => {
                    for user in client.get_all_users().await? {
                        println!(
                            "#{:<5} {:<20} {}{}",
                            user.id,
                            user.username,
                            user.email.as_deref().unwrap_or(""),
                            if user.is_admin { " (admin)" } else { "" }
                        );
                    }
                }
                AdminCommand::Logs => {
                    let logs = client.get_all_species_logs().await?;
                    logs.iter().for_each(print_log);
                    print_summary(&logs);
                }
                AdminCommand::Export { dir } => {
                    let start = Instant::now();
                    let spinner = util::spinner("Downloading CSV...");
                    let csv = client.export_csv().await;
                    spinner.finish_and_clear();
                    let csv = csv?;
                    let (path, rows) = save_export(&dir, &csv, Local::now().date_naive())?;
                    match rows {
                        Some(rows) => println!("CSV saved to: {} ({} rows)", path.display(), rows),
                        None => println!("CSV saved to: {}", path.display()),
                    }
                    util::print_hms(&start);
                }
                AdminCommand::AddQuestion {
                    text,
                    kind,
                    options,
                } => {
                    let question = client
                        .create_question(&text, &kind.into_kind(options))
                        .await?;
                    println!("Created question #{}", question.id);
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    // Initialize logger
    let default_level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let mut config = ClientConfig::new(&args.base_url);
    if let Some(timeout) = args.timeout {
        config = config.with_timeout(timeout);
    }
    let store_path = args.store.clone().unwrap_or_else(default_store_path);
    let store = Arc::new(FileCredentialStore::new(store_path));
    let client = ApiClient::new(config, store)?;

    let mut sessions = SessionManager::new(client);
    sessions.restore_session()?;

    let result = run(&mut sessions, args.command).await;
    if let Err(err) = &result {
        if sessions.expire_if_unauthorized(err)? {
            eprintln!("Session expired; please log in again.");
        }
    }
    Ok(result?)
}
