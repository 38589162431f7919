//! A provisioning tool for standing up game data without going through the
//! API: bulk question imports, per-track session creation, and full wipes.

use std::fs::File;
use std::io::BufReader;

use clap::{Arg, ArgAction, ArgMatches, Command};
use mongodb::bson::doc;
use mongodb::Database;
use rocket::serde::json::serde_json;

use gameday_backend::config::prepare_database;
use gameday_backend::model::{
    api::session::QuestionImportSpec,
    common::{QuestionSpec, Track},
    db::{
        question::{deactivate_other_questions, NewQuestion, Question},
        session::{ActiveSessionPointer, Session},
        session_participant::SessionParticipant,
        session_question::{NewSessionQuestion, SessionQuestion},
        settings::GameSettings,
        vote::Vote,
    },
    mongodb::{Coll, Counter, Id},
};

const PROGRAM_NAME: &str = "provision-gameday";

const ABOUT_TEXT: &str = "Provision game data directly in the database.

EXIT CODES:
     0: Success.
 Other: Error.";

const DB_URI: &str = "DB_URI";
const QUESTIONS_PATH: &str = "QUESTIONS_PATH";

const CREATE_TRACK_SESSIONS: &str = "create-track-sessions";
const DELETE_ALL: &str = "delete-all";
const IMPORT_QUESTIONS: &str = "import-questions";

/// Name of the production database.
const DATABASE: &str = "gameday";

/// Construct the CLI configuration.
fn cli() -> Command {
    // Make the build dirty when the toml changes.
    include_str!("../Cargo.toml");

    clap::command!(PROGRAM_NAME)
        .about(ABOUT_TEXT)
        .subcommand_required(true)
        .arg(
            Arg::new(DB_URI)
                .long("db-uri")
                .help("The MongoDB connection string")
                .action(ArgAction::Set)
                .default_value("mongodb://localhost:27017"),
        )
        .subcommand(
            Command::new(CREATE_TRACK_SESSIONS)
                .about("Create one draft session per team track from the configured questions"),
        )
        .subcommand(
            Command::new(DELETE_ALL)
                .about("Delete all sessions, rosters and votes, and clear the active pointer"),
        )
        .subcommand(
            Command::new(IMPORT_QUESTIONS)
                .about("Import questions from a JSON file, skipping duplicates by text")
                .arg(
                    Arg::new(QUESTIONS_PATH)
                        .help("Path to a JSON array of questions")
                        .action(ArgAction::Set)
                        .required(true),
                ),
        )
}

/// Connect and ensure the database is bootstrapped.
async fn connect(uri: &str) -> Result<Database, String> {
    let client = mongodb::Client::with_uri_str(uri)
        .await
        .map_err(|e| format!("Failed to connect to database: {}", e))?;
    let db = client.database(DATABASE);
    prepare_database(&db)
        .await
        .map_err(|e| format!("Failed to prepare database: {}", e))?;
    Ok(db)
}

/// Find a question by text, or materialise it from the given spec. Inserting
/// an active question sweeps the active flag off every other question.
async fn materialise_question(db: &Database, spec: &QuestionSpec) -> Result<Id, String> {
    let questions = Coll::<Question>::from_db(db);
    let by_text = doc! { "question_text": &spec.question_text };
    let existing = questions
        .find_one(by_text, None)
        .await
        .map_err(|e| e.to_string())?;
    match existing {
        Some(question) => Ok(question.id),
        None => {
            let inserted: Id = Coll::<NewQuestion>::from_db(db)
                .insert_one(NewQuestion::from(spec.clone()), None)
                .await
                .map_err(|e| e.to_string())?
                .inserted_id
                .as_object_id()
                .unwrap() // Valid because the ID comes directly from the DB
                .into();
            if spec.is_active {
                deactivate_other_questions(&questions, inserted)
                    .await
                    .map_err(|e| e.to_string())?;
            }
            Ok(inserted)
        }
    }
}

/// Create one draft session per track, containing every configured question
/// applicable to that track. Tracks without questions are skipped.
async fn create_track_sessions(db: &Database) -> Result<(), String> {
    let settings = GameSettings::load(&Coll::from_db(db))
        .await
        .map_err(|e| e.to_string())?;
    let available = settings.available_questions();

    let sessions = Coll::<Session>::from_db(db);
    let session_questions = Coll::<NewSessionQuestion>::from_db(db);
    let counters = Coll::<Counter>::from_db(db);

    for track in [Track::Leadership, Track::Backend, Track::Frontend, Track::Custom] {
        let specs: Vec<&QuestionSpec> = available
            .iter()
            .filter(|spec| spec.tracks.includes(track))
            .collect();
        if specs.is_empty() {
            println!("No questions for {}; skipping", track.group_name());
            continue;
        }

        let session_name = format!("{} Session", track.group_name());
        let exists = sessions
            .find_one(doc! { "session_name": &session_name }, None)
            .await
            .map_err(|e| e.to_string())?
            .is_some();
        if exists {
            println!("Session {} already exists; skipping", session_name);
            continue;
        }

        let session_id = Counter::next_session_id(&counters)
            .await
            .map_err(|e| e.to_string())?;
        let session = Session::new(
            session_id,
            session_name,
            track.group_name().to_string(),
            format!("Provisioned session for the {}", track.group_name()),
        );
        sessions
            .insert_one(&session, None)
            .await
            .map_err(|e| e.to_string())?;

        for (index, spec) in specs.iter().enumerate() {
            let question_id = materialise_question(db, spec).await?;
            session_questions
                .insert_one(
                    NewSessionQuestion::new(session_id, question_id, index as u32 + 1),
                    None,
                )
                .await
                .map_err(|e| e.to_string())?;
        }

        println!(
            "Created session {} ({}) with {} questions",
            session_id,
            session.session_name,
            specs.len()
        );
    }

    Ok(())
}

/// Delete every session and everything hanging off one.
async fn delete_all(db: &Database) -> Result<(), String> {
    let sessions = Coll::<Session>::from_db(db)
        .delete_many(doc! {}, None)
        .await
        .map_err(|e| e.to_string())?
        .deleted_count;
    Coll::<SessionQuestion>::from_db(db)
        .delete_many(doc! {}, None)
        .await
        .map_err(|e| e.to_string())?;
    Coll::<SessionParticipant>::from_db(db)
        .delete_many(doc! {}, None)
        .await
        .map_err(|e| e.to_string())?;
    let votes = Coll::<Vote>::from_db(db)
        .delete_many(doc! {}, None)
        .await
        .map_err(|e| e.to_string())?
        .deleted_count;
    Coll::<Question>::from_db(db)
        .delete_many(doc! {}, None)
        .await
        .map_err(|e| e.to_string())?;
    Coll::<ActiveSessionPointer>::from_db(db)
        .update_one(
            ActiveSessionPointer::filter(),
            doc! { "$set": { "session": null } },
            None,
        )
        .await
        .map_err(|e| e.to_string())?;

    println!("Deleted {} sessions and {} votes", sessions, votes);
    Ok(())
}

/// Import questions from a JSON file, mirroring `POST /questions/import`.
async fn import_questions(db: &Database, path: &str) -> Result<(), String> {
    let file = BufReader::new(File::open(path).map_err(|e| format!("IO error: {}", e))?);
    let specs: Vec<QuestionImportSpec> =
        serde_json::from_reader(file).map_err(|e| format!("Invalid JSON: {}", e))?;

    let questions = Coll::<Question>::from_db(db);
    let new_questions = Coll::<NewQuestion>::from_db(db);
    let mut imported = 0;
    let mut skipped = 0;

    for spec in specs {
        let question_text = spec.question_text.trim().to_string();
        if question_text.is_empty() {
            skipped += 1;
            continue;
        }

        let by_text = doc! { "question_text": &question_text };
        let exists = questions
            .find_one(by_text, None)
            .await
            .map_err(|e| e.to_string())?
            .is_some();
        if exists {
            skipped += 1;
            continue;
        }

        let is_active = spec.is_active;
        let tracks = spec.tracks();
        let inserted: Id = new_questions
            .insert_one(
                NewQuestion {
                    question_text,
                    is_active,
                    tracks,
                    created_at: chrono::Utc::now(),
                },
                None,
            )
            .await
            .map_err(|e| e.to_string())?
            .inserted_id
            .as_object_id()
            .unwrap() // Valid because the ID comes directly from the DB
            .into();
        if is_active {
            deactivate_other_questions(&questions, inserted)
                .await
                .map_err(|e| e.to_string())?;
        }
        imported += 1;
    }

    println!("Imported {} questions ({} skipped)", imported, skipped);
    Ok(())
}

/// Dispatch the selected subcommand and return the exit code.
async fn run(args: &ArgMatches) -> u8 {
    let uri: &String = args.get_one(DB_URI).unwrap(); // Defaulted argument is guaranteed to be present.
    let db = match connect(uri).await {
        Ok(db) => db,
        Err(msg) => {
            println!("{}", msg);
            return 1;
        }
    };

    let result = match args.subcommand().unwrap() {
        // Subcommand is required.
        (CREATE_TRACK_SESSIONS, _) => create_track_sessions(&db).await,
        (DELETE_ALL, _) => delete_all(&db).await,
        (IMPORT_QUESTIONS, sub_args) => {
            let path: &String = sub_args.get_one(QUESTIONS_PATH).unwrap();
            import_questions(&db, path).await
        }
        _ => unreachable!("Unknown subcommands are rejected by clap"),
    };

    match result {
        Ok(()) => 0,
        Err(msg) => {
            println!("{}", msg);
            1
        }
    }
}

fn main() {
    let args = cli().get_matches();
    let exit_code = rocket::execute(run(&args));
    std::process::exit(exit_code.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_cli_usage() {
        let command_line = [PROGRAM_NAME, CREATE_TRACK_SESSIONS];
        cli().try_get_matches_from(command_line).unwrap();

        let command_line = [PROGRAM_NAME, "--db-uri", "mongodb://example:27017", DELETE_ALL];
        let args = cli().try_get_matches_from(command_line).unwrap();
        let uri: &String = args.get_one(DB_URI).unwrap();
        assert_eq!("mongodb://example:27017", uri);

        let command_line = [PROGRAM_NAME, IMPORT_QUESTIONS, "questions.json"];
        let args = cli().try_get_matches_from(command_line).unwrap();
        let (name, sub_args) = args.subcommand().unwrap();
        assert_eq!(IMPORT_QUESTIONS, name);
        let path: &String = sub_args.get_one(QUESTIONS_PATH).unwrap();
        assert_eq!("questions.json", path);
    }

    #[test]
    fn bad_cli_usage() {
        // No subcommand at all.
        let command_line = [PROGRAM_NAME];
        cli().try_get_matches_from(command_line).unwrap_err();

        // Unknown subcommand.
        let command_line = [PROGRAM_NAME, "frobnicate"];
        cli().try_get_matches_from(command_line).unwrap_err();

        // Import without a file.
        let command_line = [PROGRAM_NAME, IMPORT_QUESTIONS];
        cli().try_get_matches_from(command_line).unwrap_err();
    }
}
