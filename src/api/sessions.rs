use std::collections::HashMap;

use chrono::{Duration, Utc};
use mongodb::{
    bson::{doc, Bson, DateTime as BsonDateTime},
    options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument},
    Client,
};
use rocket::{futures::TryStreamExt, serde::json::Json, Route, State};
use serde::Serialize;

use crate::api::common;
use crate::error::{Error, Result};
use crate::model::{
    api::{
        auth::AuthToken,
        response::Envelope,
        session::{
            ActivateQuestionPayload, CreateSessionPayload, CreateSessionRequest,
            ImportQuestionsPayload, ParticipantDescription, ParticipantSpec, QuestionImportSpec,
            SessionQuestionDescription, SessionSummary,
        },
    },
    common::{SessionId, SessionState},
    db::{
        question::{
            deactivate_other_questions, deactivate_other_questions_with_session, NewQuestion,
            Question,
        },
        session::{ActiveSessionPointer, Session},
        session_participant::{NewSessionParticipant, SessionParticipant},
        session_question::{NewSessionQuestion, SessionQuestion},
        settings::GameSettings,
        vote::Vote,
    },
    mongodb::{session_id_filter, Coll, Counter, Id},
};

pub fn routes() -> Vec<Route> {
    routes![
        get_sessions,
        create_session,
        start_session,
        reactivate_session,
        activate_question,
        reset_votes,
        reset_session,
        expire_question,
        get_session_questions,
        get_session_participants,
        update_participants,
        import_questions,
    ]
}

#[derive(Serialize)]
struct SessionsPayload {
    sessions: Vec<SessionSummary>,
}

/// All sessions, newest first.
#[get("/sessions")]
async fn get_sessions(
    _token: AuthToken,
    sessions: Coll<Session>,
) -> Result<Json<Envelope<SessionsPayload>>> {
    let options = FindOptions::builder().sort(doc! { "created_at": -1 }).build();
    let all: Vec<Session> = sessions.find(None, options).await?.try_collect().await?;
    Ok(Json(Envelope::success(SessionsPayload {
        sessions: all.into_iter().map(Into::into).collect(),
    })))
}

/// Create a draft session, materialising its questions from the settings
/// blob and inserting its participant roster.
///
/// Question names not present in the blob are skipped rather than failing
/// the whole request. Questions are deduplicated by text: a question already
/// materialised by an earlier session is reused.
#[post("/sessions", data = "<request>", format = "json")]
#[allow(clippy::too_many_arguments)]
async fn create_session(
    request: Json<CreateSessionRequest>,
    sessions: Coll<Session>,
    questions: Coll<Question>,
    new_questions: Coll<NewQuestion>,
    session_questions: Coll<NewSessionQuestion>,
    participants: Coll<NewSessionParticipant>,
    settings: Coll<GameSettings>,
    counters: Coll<Counter>,
    db_client: &State<Client>,
) -> Result<Json<Envelope<CreateSessionPayload>>> {
    let request = request.0;
    let settings = GameSettings::load(&settings).await?;
    let available = settings.available_questions();

    let session_id = Counter::next_session_id(&counters).await?;
    let session = Session::new(
        session_id,
        request.session_name,
        request.team_group,
        request.description,
    );

    let mut txn = db_client.start_session(None).await?;
    txn.start_transaction(None).await?;

    sessions
        .insert_one_with_session(&session, None, &mut txn)
        .await?;

    let mut order = 0;
    for name in &request.questions {
        let spec = match available.iter().find(|spec| spec.name == *name) {
            Some(spec) => spec,
            None => {
                warn!("Skipping unknown question {} for session {}", name, session_id);
                continue;
            }
        };
        order += 1;

        let by_text = doc! { "question_text": &spec.question_text };
        let question_id: Id = match questions
            .find_one_with_session(by_text, None, &mut txn)
            .await?
        {
            Some(question) => question.id,
            None => {
                let new_question = NewQuestion::from(spec.clone());
                let is_active = new_question.is_active;
                let inserted: Id = new_questions
                    .insert_one_with_session(new_question, None, &mut txn)
                    .await?
                    .inserted_id
                    .as_object_id()
                    .unwrap() // Valid because the ID comes directly from the DB
                    .into();
                if is_active {
                    deactivate_other_questions_with_session(&questions, inserted, &mut txn)
                        .await?;
                }
                inserted
            }
        };
        session_questions
            .insert_one_with_session(
                NewSessionQuestion::new(session_id, question_id, order),
                None,
                &mut txn,
            )
            .await?;
    }

    for (index, participant) in request.participants.iter().enumerate() {
        let new_participant = NewSessionParticipant::new(
            session_id,
            participant.name.clone(),
            participant.team.clone(),
            index as u32 + 1,
        );
        participants
            .insert_one_with_session(new_participant, None, &mut txn)
            .await?;
    }

    txn.commit_transaction().await?;

    info!("Created session {} ({})", session_id, session.session_name);
    Ok(Json(Envelope::success_with(
        "Session created successfully",
        CreateSessionPayload { session_id },
    )))
}

/// Make the given session the active one. The previously active session is
/// completed; votes already cast in this session are kept.
#[post("/sessions/<session_id>/start")]
async fn start_session(
    session_id: SessionId,
    sessions: Coll<Session>,
    pointers: Coll<ActiveSessionPointer>,
    session_questions: Coll<SessionQuestion>,
    votes: Coll<Vote>,
    db_client: &State<Client>,
) -> Result<Json<Envelope>> {
    set_active_session(
        db_client,
        &sessions,
        &pointers,
        &session_questions,
        &votes,
        session_id,
        false,
    )
    .await?;
    Ok(Json(Envelope::message("Session started successfully")))
}

/// Re-run a completed session from scratch: wipe its votes, reset question
/// completion, and make it the active session.
#[post("/sessions/<session_id>/reactivate")]
async fn reactivate_session(
    session_id: SessionId,
    sessions: Coll<Session>,
    pointers: Coll<ActiveSessionPointer>,
    session_questions: Coll<SessionQuestion>,
    votes: Coll<Vote>,
    db_client: &State<Client>,
) -> Result<Json<Envelope>> {
    set_active_session(
        db_client,
        &sessions,
        &pointers,
        &session_questions,
        &votes,
        session_id,
        true,
    )
    .await?;
    Ok(Json(Envelope::message("Session reactivated successfully")))
}

/// Flip the active-session pointer to the given session inside a transaction.
///
/// The pointer is the single source of truth for which session is active, so
/// two racing calls serialise on it and cannot leave two Active sessions
/// behind. The previously active session (if any) is marked Completed. With
/// `wipe_votes` the target session also has its votes deleted and its
/// question completion flags reset.
async fn set_active_session(
    db_client: &Client,
    sessions: &Coll<Session>,
    pointers: &Coll<ActiveSessionPointer>,
    session_questions: &Coll<SessionQuestion>,
    votes: &Coll<Vote>,
    session_id: SessionId,
    wipe_votes: bool,
) -> Result<()> {
    let mut txn = db_client.start_session(None).await?;
    txn.start_transaction(None).await?;

    sessions
        .find_one_with_session(session_id_filter(session_id), None, &mut txn)
        .await?
        .ok_or_else(|| Error::not_found("Session not found"))?;

    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::Before)
        .upsert(true)
        .build();
    let previous = pointers
        .find_one_and_update_with_session(
            ActiveSessionPointer::filter(),
            doc! { "$set": { "session": i64::from(session_id) } },
            options,
            &mut txn,
        )
        .await?
        .and_then(|pointer| pointer.session)
        .filter(|previous| *previous != session_id);

    if let Some(previous) = previous {
        sessions
            .update_one_with_session(
                session_id_filter(previous),
                doc! { "$set": { "status": SessionState::Completed } },
                None,
                &mut txn,
            )
            .await?;
    }

    if wipe_votes {
        votes
            .delete_many_with_session(
                doc! { "session": i64::from(session_id) },
                None,
                &mut txn,
            )
            .await?;
        session_questions
            .update_many_with_session(
                doc! { "session": i64::from(session_id) },
                doc! { "$set": { "is_completed": false } },
                None,
                &mut txn,
            )
            .await?;
    }

    sessions
        .update_one_with_session(
            session_id_filter(session_id),
            doc! { "$set": { "status": SessionState::Active } },
            None,
            &mut txn,
        )
        .await?;

    txn.commit_transaction().await?;
    Ok(())
}

/// Open a question for voting with the configured timer.
#[post("/sessions/<session_id>/questions/<question_id>/activate")]
async fn activate_question(
    _token: AuthToken,
    session_id: SessionId,
    question_id: Id,
    sessions: Coll<Session>,
    session_questions: Coll<SessionQuestion>,
    settings: Coll<GameSettings>,
) -> Result<Json<Envelope<ActivateQuestionPayload>>> {
    let session = common::session_by_id(&sessions, session_id).await?;
    if session.status != SessionState::Active {
        return Ok(Json(Envelope::rejected("Session is not active")));
    }

    let assigned = doc! {
        "session": i64::from(session_id),
        "question": question_id,
    };
    if session_questions.find_one(assigned, None).await?.is_none() {
        return Ok(Json(Envelope::rejected(
            "Question not assigned to this session",
        )));
    }

    let settings = GameSettings::load(&settings).await?;
    let timer_seconds = settings.voting_timer_seconds;
    let start = Utc::now();
    let voting_deadline = start + Duration::seconds(i64::from(timer_seconds));

    sessions
        .update_one(
            session_id_filter(session_id),
            doc! { "$set": {
                "current_question": question_id,
                "question_start_time": BsonDateTime::from_chrono(start),
                "voting_deadline": BsonDateTime::from_chrono(voting_deadline),
            } },
            None,
        )
        .await?;

    info!("Activated question {} in session {}", question_id, session_id);
    Ok(Json(Envelope::success_with(
        "Question activated successfully",
        ActivateQuestionPayload {
            question_id: question_id.into(),
            timer_seconds,
            voting_deadline,
        },
    )))
}

/// Delete votes for one question of a session, or for the whole session.
#[post("/sessions/<session_id>/votes/reset?<question_id>")]
async fn reset_votes(
    session_id: SessionId,
    question_id: Option<Id>,
    sessions: Coll<Session>,
    votes: Coll<Vote>,
) -> Result<Json<Envelope>> {
    common::session_by_id(&sessions, session_id).await?;

    let message = match question_id {
        Some(question_id) => {
            votes
                .delete_many(
                    doc! { "session": i64::from(session_id), "question": question_id },
                    None,
                )
                .await?;
            "Votes reset for question in session"
        }
        None => {
            votes
                .delete_many(doc! { "session": i64::from(session_id) }, None)
                .await?;
            "All votes have been reset for this session"
        }
    };
    Ok(Json(Envelope::message(message)))
}

/// Reset a session back to its pre-game state: no votes, no current
/// question, nothing completed. The lifecycle status is left untouched.
#[post("/sessions/<session_id>/reset")]
async fn reset_session(
    session_id: SessionId,
    sessions: Coll<Session>,
    session_questions: Coll<SessionQuestion>,
    votes: Coll<Vote>,
    db_client: &State<Client>,
) -> Result<Json<Envelope>> {
    common::session_by_id(&sessions, session_id).await?;

    let mut txn = db_client.start_session(None).await?;
    txn.start_transaction(None).await?;

    votes
        .delete_many_with_session(doc! { "session": i64::from(session_id) }, None, &mut txn)
        .await?;
    session_questions
        .update_many_with_session(
            doc! { "session": i64::from(session_id) },
            doc! { "$set": { "is_completed": false } },
            None,
            &mut txn,
        )
        .await?;
    sessions
        .update_one_with_session(
            session_id_filter(session_id),
            doc! { "$set": {
                "current_question": null,
                "question_start_time": null,
                "voting_deadline": null,
            } },
            None,
            &mut txn,
        )
        .await?;

    txn.commit_transaction().await?;
    Ok(Json(Envelope::message("Session reset successfully")))
}

/// Clear the current question once its deadline has passed, marking it
/// completed. Expiry is lazy: nothing fires at the deadline itself, the
/// session runner calls this when the timer display hits zero.
#[post("/sessions/<session_id>/expire")]
async fn expire_question(
    session_id: SessionId,
    sessions: Coll<Session>,
    session_questions: Coll<SessionQuestion>,
) -> Result<Json<Envelope>> {
    let session = common::session_by_id(&sessions, session_id).await?;

    let expired = matches!(session.voting_deadline, Some(deadline) if Utc::now() > deadline);
    if !expired {
        return Ok(Json(Envelope::rejected("Question has not expired yet")));
    }

    if let Some(question_id) = session.current_question {
        session_questions
            .update_one(
                doc! { "session": i64::from(session_id), "question": question_id },
                doc! { "$set": { "is_completed": true } },
                None,
            )
            .await?;
    }
    sessions
        .update_one(
            session_id_filter(session_id),
            doc! { "$set": {
                "current_question": null,
                "question_start_time": null,
                "voting_deadline": null,
            } },
            None,
        )
        .await?;

    Ok(Json(Envelope::message("Expired question cleared")))
}

#[derive(Serialize)]
struct SessionQuestionsPayload {
    questions: Vec<SessionQuestionDescription>,
}

/// The questions assigned to a session, in play order, joined with their text.
#[get("/sessions/<session_id>/questions")]
async fn get_session_questions(
    session_id: SessionId,
    session_questions: Coll<SessionQuestion>,
    questions: Coll<Question>,
) -> Result<Json<Envelope<SessionQuestionsPayload>>> {
    let options = FindOptions::builder().sort(doc! { "question_order": 1 }).build();
    let assigned: Vec<SessionQuestion> = session_questions
        .find(doc! { "session": i64::from(session_id) }, options)
        .await?
        .try_collect()
        .await?;

    let ids: Vec<Bson> = assigned.iter().map(|sq| Bson::from(sq.question)).collect();
    let texts: HashMap<Id, String> = questions
        .find(doc! { "_id": { "$in": ids } }, None)
        .await?
        .map_ok(|question| (question.id, question.question.question_text))
        .try_collect()
        .await?;

    let questions = assigned
        .into_iter()
        .map(|sq| SessionQuestionDescription {
            id: sq.id.into(),
            question_id: sq.question.into(),
            question_text: texts.get(&sq.question).cloned().unwrap_or_default(),
            question_order: sq.question_order,
            is_completed: sq.is_completed,
        })
        .collect();
    Ok(Json(Envelope::success(SessionQuestionsPayload { questions })))
}

#[derive(Serialize)]
struct ParticipantsPayload {
    participants: Vec<ParticipantDescription>,
}

/// The participant roster of a session, in display order.
#[get("/sessions/<session_id>/participants")]
async fn get_session_participants(
    _token: AuthToken,
    session_id: SessionId,
    participants: Coll<SessionParticipant>,
) -> Result<Json<Envelope<ParticipantsPayload>>> {
    let participants = common::session_participants(&participants, session_id).await?;
    Ok(Json(Envelope::success(ParticipantsPayload {
        participants: participants.iter().map(Into::into).collect(),
    })))
}

/// Replace the participant roster of a session.
#[put("/sessions/<session_id>/participants", data = "<request>", format = "json")]
async fn update_participants(
    session_id: SessionId,
    request: Json<Vec<ParticipantSpec>>,
    sessions: Coll<Session>,
    participants: Coll<SessionParticipant>,
    new_participants: Coll<NewSessionParticipant>,
    db_client: &State<Client>,
) -> Result<Json<Envelope>> {
    common::session_by_id(&sessions, session_id).await?;

    let roster: Vec<NewSessionParticipant> = request
        .0
        .into_iter()
        .enumerate()
        .map(|(index, participant)| {
            NewSessionParticipant::new(
                session_id,
                participant.name,
                participant.team,
                index as u32 + 1,
            )
        })
        .collect();

    let mut txn = db_client.start_session(None).await?;
    txn.start_transaction(None).await?;

    participants
        .delete_many_with_session(doc! { "session": i64::from(session_id) }, None, &mut txn)
        .await?;
    if !roster.is_empty() {
        new_participants
            .insert_many_with_session(&roster, None, &mut txn)
            .await?;
    }

    txn.commit_transaction().await?;
    Ok(Json(Envelope::message("Participants updated successfully")))
}

/// Bulk-import questions, skipping blanks and duplicates by text.
#[post("/questions/import", data = "<request>", format = "json")]
async fn import_questions(
    request: Json<Vec<QuestionImportSpec>>,
    questions: Coll<Question>,
    new_questions: Coll<NewQuestion>,
) -> Result<Json<Envelope<ImportQuestionsPayload>>> {
    let mut imported = 0;
    let mut skipped = 0;

    for spec in request.0 {
        let question_text = spec.question_text.trim().to_string();
        if question_text.is_empty() {
            skipped += 1;
            continue;
        }

        let by_text = doc! { "question_text": &question_text };
        if questions.find_one(by_text, None).await?.is_some() {
            skipped += 1;
            continue;
        }

        let new_question = NewQuestion {
            question_text,
            is_active: spec.is_active,
            tracks: spec.tracks(),
            created_at: Utc::now(),
        };
        let inserted: Id = new_questions
            .insert_one(&new_question, None)
            .await?
            .inserted_id
            .as_object_id()
            .unwrap() // Valid because the ID comes directly from the DB
            .into();
        if new_question.is_active {
            deactivate_other_questions(&questions, inserted).await?;
        }
        imported += 1;
    }

    info!("Imported {} questions ({} skipped)", imported, skipped);
    Ok(Json(Envelope::success_with(
        "Questions imported successfully!",
        ImportQuestionsPayload { imported, skipped },
    )))
}

#[cfg(test)]
mod tests {
    use mongodb::Database;
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::{serde_json, serde_json::json, Value},
    };

    use crate::model::common::Tracks;
    use crate::model::db::vote::NewVote;

    use super::*;

    #[backend_test]
    async fn create_session_full(client: Client, db: Database) {
        // This test walks the full provisioning path, so enable logging.
        log4rs_test_utils::test_logging::init_logging_once_for(["gameday_backend"], None, None);

        let session_id = create(&client, &CreateSessionRequest::example()).await;

        // Session document exists as a draft.
        let session = Coll::<Session>::from_db(&db)
            .find_one(session_id_filter(session_id), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(SessionState::Draft, session.status);
        assert_eq!(None, session.current_question);

        // Both sample questions were materialised and associated in order.
        let assigned = session_questions_of(&db, session_id).await;
        assert_eq!(2, assigned.len());
        assert_eq!(vec![1, 2], assigned.iter().map(|sq| sq.question_order).collect::<Vec<_>>());
        for sq in &assigned {
            let question = Coll::<Question>::from_db(&db)
                .find_one(sq.question.as_doc(), None)
                .await
                .unwrap();
            assert!(question.is_some());
        }

        // The roster was inserted with 1-based display order.
        let roster = common::session_participants(&Coll::from_db(&db), session_id)
            .await
            .unwrap();
        assert_eq!(3, roster.len());
        assert_eq!("Alex Backend", roster[0].participant_name);
        assert_eq!(1, roster[0].display_order);
    }

    #[backend_test]
    async fn create_session_skips_unknown_questions(client: Client, db: Database) {
        let mut request = CreateSessionRequest::example();
        request.questions = vec!["Q1".to_string(), "NOPE".to_string()];
        let session_id = create(&client, &request).await;

        let assigned = session_questions_of(&db, session_id).await;
        assert_eq!(1, assigned.len());
        assert_eq!(1, assigned[0].question_order);
    }

    #[backend_test]
    async fn create_session_sweeps_active_flag(client: Client, db: Database) {
        // A question flagged active before the session exists.
        let existing: Id = Coll::<NewQuestion>::from_db(&db)
            .insert_one(
                NewQuestion {
                    question_text: "Who is most likely to answer pages at 3am?".to_string(),
                    is_active: true,
                    tracks: Tracks::default(),
                    created_at: Utc::now(),
                },
                None,
            )
            .await
            .unwrap()
            .inserted_id
            .as_object_id()
            .unwrap()
            .into();

        // Materialising the active sample question Q1 must steal the flag.
        create(&client, &CreateSessionRequest::example()).await;

        let previous = Coll::<Question>::from_db(&db)
            .find_one(existing.as_doc(), None)
            .await
            .unwrap()
            .unwrap();
        assert!(!previous.is_active);
        let active_count = Coll::<Question>::from_db(&db)
            .count_documents(doc! { "is_active": true }, None)
            .await
            .unwrap();
        assert_eq!(1, active_count);
    }

    #[backend_test]
    async fn sequential_session_ids(client: Client) {
        let first = create(&client, &CreateSessionRequest::example()).await;
        let second = create(&client, &CreateSessionRequest::example()).await;
        assert_eq!(first + 1, second);
    }

    #[backend_test]
    async fn start_completes_previous(client: Client, db: Database) {
        let first = create(&client, &CreateSessionRequest::example()).await;
        let second = create(&client, &CreateSessionRequest::example()).await;

        start(&client, first).await;
        assert_eq!(SessionState::Active, status_of(&db, first).await);

        // Starting the second session completes the first and moves the pointer.
        start(&client, second).await;
        assert_eq!(SessionState::Completed, status_of(&db, first).await);
        assert_eq!(SessionState::Active, status_of(&db, second).await);
        let pointer = Coll::<ActiveSessionPointer>::from_db(&db)
            .find_one(ActiveSessionPointer::filter(), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(Some(second), pointer.session);
    }

    #[backend_test]
    async fn start_unknown_session(client: Client) {
        let response = client.post(uri!(start_session(999))).dispatch().await;
        assert_eq!(Status::NotFound, response.status());

        let body = body_json(response.into_string().await).await;
        assert_eq!(json!(false), body["success"]);
        assert_eq!(json!("Session not found"), body["message"]);
    }

    #[backend_test]
    async fn start_keeps_votes_reactivate_wipes_them(client: Client, db: Database) {
        let session_id = create(&client, &CreateSessionRequest::example()).await;
        start(&client, session_id).await;

        // Cast a vote and mark a question completed, as a played session would.
        let assigned = session_questions_of(&db, session_id).await;
        let roster = common::session_participants(&Coll::from_db(&db), session_id)
            .await
            .unwrap();
        Coll::<NewVote>::from_db(&db)
            .insert_one(
                NewVote::new(session_id, assigned[0].question, roster[0].id, "10.0.0.1_1".into()),
                None,
            )
            .await
            .unwrap();
        Coll::<SessionQuestion>::from_db(&db)
            .update_one(
                assigned[0].id.as_doc(),
                doc! { "$set": { "is_completed": true } },
                None,
            )
            .await
            .unwrap();

        // Plain start leaves the votes alone.
        start(&client, session_id).await;
        assert_eq!(1, count_votes(&db, session_id).await);

        // Reactivation wipes votes and completion flags.
        let response = client
            .post(uri!(reactivate_session(session_id)))
            .dispatch()
            .await;
        let body = body_json(response.into_string().await).await;
        assert_eq!(json!("Session reactivated successfully"), body["message"]);

        assert_eq!(0, count_votes(&db, session_id).await);
        let assigned = session_questions_of(&db, session_id).await;
        assert!(assigned.iter().all(|sq| !sq.is_completed));
        assert_eq!(SessionState::Active, status_of(&db, session_id).await);
    }

    #[backend_test(admin)]
    async fn activate_question_with_timer(client: Client, db: Database) {
        let session_id = create(&client, &CreateSessionRequest::example()).await;
        let assigned = session_questions_of(&db, session_id).await;
        let question_id = assigned[0].question;

        // Activating in a non-active session is rejected.
        let body = activate(&client, session_id, question_id).await;
        assert_eq!(json!(false), body["success"]);
        assert_eq!(json!("Session is not active"), body["message"]);

        start(&client, session_id).await;

        // A question not assigned to the session is rejected.
        let body = activate(&client, session_id, Id::new()).await;
        assert_eq!(json!(false), body["success"]);
        assert_eq!(json!("Question not assigned to this session"), body["message"]);

        // Activating an assigned question stamps the timer.
        let body = activate(&client, session_id, question_id).await;
        assert_eq!(json!(true), body["success"]);
        assert_eq!(json!("Question activated successfully"), body["message"]);
        assert_eq!(json!(30), body["timer_seconds"]);

        let session = Coll::<Session>::from_db(&db)
            .find_one(session_id_filter(session_id), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(Some(question_id), session.current_question);
        assert!(session.is_voting_open());
        assert!(session.time_remaining() > 0);
    }

    #[backend_test]
    async fn activate_question_requires_admin(client: Client, db: Database) {
        let session_id = create(&client, &CreateSessionRequest::example()).await;
        start(&client, session_id).await;
        let assigned = session_questions_of(&db, session_id).await;

        let response = client
            .post(uri!(activate_question(session_id, assigned[0].question)))
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());
    }

    #[backend_test]
    async fn reset_votes_for_question_and_session(client: Client, db: Database) {
        let session_id = create(&client, &CreateSessionRequest::example()).await;
        let assigned = session_questions_of(&db, session_id).await;
        let roster = common::session_participants(&Coll::from_db(&db), session_id)
            .await
            .unwrap();

        // One vote on each question from distinct voters.
        let votes = vec![
            NewVote::new(session_id, assigned[0].question, roster[0].id, "10.0.0.1_1".into()),
            NewVote::new(session_id, assigned[1].question, roster[1].id, "10.0.0.1_1".into()),
        ];
        Coll::<NewVote>::from_db(&db)
            .insert_many(&votes, None)
            .await
            .unwrap();

        // Reset one question's votes.
        let response = client
            .post(format!(
                "/sessions/{}/votes/reset?question_id={}",
                session_id, assigned[0].question
            ))
            .dispatch()
            .await;
        let body = body_json(response.into_string().await).await;
        assert_eq!(json!("Votes reset for question in session"), body["message"]);
        assert_eq!(1, count_votes(&db, session_id).await);

        // Reset the rest.
        let response = client
            .post(format!("/sessions/{}/votes/reset", session_id))
            .dispatch()
            .await;
        let body = body_json(response.into_string().await).await;
        assert_eq!(
            json!("All votes have been reset for this session"),
            body["message"]
        );
        assert_eq!(0, count_votes(&db, session_id).await);
    }

    #[backend_test(admin)]
    async fn expire_clears_question_lazily(client: Client, db: Database) {
        let session_id = create(&client, &CreateSessionRequest::example()).await;
        start(&client, session_id).await;
        let assigned = session_questions_of(&db, session_id).await;
        let question_id = assigned[0].question;
        activate(&client, session_id, question_id).await;

        // The deadline is still in the future.
        let response = client.post(uri!(expire_question(session_id))).dispatch().await;
        let body = body_json(response.into_string().await).await;
        assert_eq!(json!(false), body["success"]);
        assert_eq!(json!("Question has not expired yet"), body["message"]);

        // Push the deadline into the past and expire again.
        let expired = Utc::now() - Duration::seconds(5);
        Coll::<Session>::from_db(&db)
            .update_one(
                session_id_filter(session_id),
                doc! { "$set": { "voting_deadline": BsonDateTime::from_chrono(expired) } },
                None,
            )
            .await
            .unwrap();
        let response = client.post(uri!(expire_question(session_id))).dispatch().await;
        let body = body_json(response.into_string().await).await;
        assert_eq!(json!(true), body["success"]);
        assert_eq!(json!("Expired question cleared"), body["message"]);

        // Question state is cleared and the association marked completed.
        let session = Coll::<Session>::from_db(&db)
            .find_one(session_id_filter(session_id), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(None, session.current_question);
        assert_eq!(None, session.voting_deadline);
        let assigned = session_questions_of(&db, session_id).await;
        assert!(assigned[0].is_completed);
    }

    #[backend_test(admin)]
    async fn reset_entire_session(client: Client, db: Database) {
        let session_id = create(&client, &CreateSessionRequest::example()).await;
        start(&client, session_id).await;
        let assigned = session_questions_of(&db, session_id).await;
        activate(&client, session_id, assigned[0].question).await;

        let roster = common::session_participants(&Coll::from_db(&db), session_id)
            .await
            .unwrap();
        Coll::<NewVote>::from_db(&db)
            .insert_one(
                NewVote::new(session_id, assigned[0].question, roster[0].id, "10.0.0.1_1".into()),
                None,
            )
            .await
            .unwrap();

        let response = client.post(uri!(reset_session(session_id))).dispatch().await;
        let body = body_json(response.into_string().await).await;
        assert_eq!(json!("Session reset successfully"), body["message"]);

        assert_eq!(0, count_votes(&db, session_id).await);
        let session = Coll::<Session>::from_db(&db)
            .find_one(session_id_filter(session_id), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(None, session.current_question);
        assert_eq!(None, session.question_start_time);
        assert_eq!(None, session.voting_deadline);
        // Status is untouched by a reset.
        assert_eq!(SessionState::Active, session.status);

        // The cumulative tally confirms the wipe: no votes, no voted questions.
        let response = client
            .get(format!("/game/results/cumulative?session_id={}", session_id))
            .dispatch()
            .await;
        let body = body_json(response.into_string().await).await;
        assert_eq!(json!(true), body["success"]);
        assert_eq!(json!(0), body["total_votes"]);
        assert_eq!(json!(0), body["questions_count"]);
    }

    #[backend_test]
    async fn session_questions_listing(client: Client, db: Database) {
        let session_id = create(&client, &CreateSessionRequest::example()).await;
        let assigned = session_questions_of(&db, session_id).await;

        let response = client
            .get(uri!(get_session_questions(session_id)))
            .dispatch()
            .await;
        let body = body_json(response.into_string().await).await;
        assert_eq!(json!(true), body["success"]);

        let questions = body["questions"].as_array().unwrap();
        assert_eq!(assigned.len(), questions.len());
        assert_eq!(json!(1), questions[0]["question_order"]);
        assert_eq!(
            json!("Who is most likely to work late?"),
            questions[0]["question_text"]
        );
        assert_eq!(json!(false), questions[0]["is_completed"]);
    }

    #[backend_test(admin)]
    async fn session_listing_newest_first(client: Client) {
        let first = create(&client, &CreateSessionRequest::example()).await;
        let second = create(&client, &CreateSessionRequest::example()).await;

        let response = client.get(uri!(get_sessions)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let body = body_json(response.into_string().await).await;

        let ids: Vec<u64> = body["sessions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|session| session["id"].as_u64().unwrap())
            .collect();
        assert_eq!(vec![u64::from(second), u64::from(first)], ids);
    }

    #[backend_test]
    async fn session_listing_requires_admin(client: Client) {
        let response = client.get(uri!(get_sessions)).dispatch().await;
        assert_eq!(Status::NotFound, response.status());
    }

    #[backend_test(admin)]
    async fn roster_update_replaces_participants(client: Client, db: Database) {
        let session_id = create(&client, &CreateSessionRequest::example()).await;

        let new_roster = vec![
            ParticipantSpec {
                name: "Nina Networks".to_string(),
                team: "Infra".to_string(),
            },
            ParticipantSpec {
                name: "Omar Oncall".to_string(),
                team: "SRE".to_string(),
            },
        ];
        let response = client
            .put(uri!(update_participants(session_id)))
            .header(ContentType::JSON)
            .body(json!(new_roster).to_string())
            .dispatch()
            .await;
        let body = body_json(response.into_string().await).await;
        assert_eq!(json!("Participants updated successfully"), body["message"]);

        let roster = common::session_participants(&Coll::from_db(&db), session_id)
            .await
            .unwrap();
        assert_eq!(2, roster.len());
        assert_eq!("Nina Networks", roster[0].participant_name);
        assert_eq!(1, roster[0].display_order);
        assert_eq!("Omar Oncall", roster[1].participant_name);
        assert_eq!(2, roster[1].display_order);

        // The admin listing shows the new roster.
        let response = client
            .get(uri!(get_session_participants(session_id)))
            .dispatch()
            .await;
        let body = body_json(response.into_string().await).await;
        assert_eq!(2, body["participants"].as_array().unwrap().len());
    }

    #[backend_test]
    async fn import_skips_duplicates_and_blanks(client: Client, db: Database) {
        let specs = json!([
            {
                "question_text": "Who is most likely to rewrite it in Rust?",
                "is_active": true,
            },
            {
                "question_text": "Who is most likely to rewrite it in Rust?",
            },
            {
                "question_text": "   ",
            },
        ]);
        let response = client
            .post(uri!(import_questions))
            .header(ContentType::JSON)
            .body(specs.to_string())
            .dispatch()
            .await;
        let body = body_json(response.into_string().await).await;
        assert_eq!(json!(true), body["success"]);
        assert_eq!(json!("Questions imported successfully!"), body["message"]);
        assert_eq!(json!(1), body["imported"]);
        assert_eq!(json!(2), body["skipped"]);

        // Absent track flags default to applicable.
        let question = Coll::<Question>::from_db(&db)
            .find_one(
                doc! { "question_text": "Who is most likely to rewrite it in Rust?" },
                None,
            )
            .await
            .unwrap()
            .unwrap();
        assert!(question.is_active);
        assert!(question.tracks.for_leadership_track);
        assert!(question.tracks.for_custom_sessions);
    }

    #[backend_test]
    async fn import_active_question_deactivates_others(client: Client, db: Database) {
        let existing: Id = Coll::<NewQuestion>::from_db(&db)
            .insert_one(NewQuestion::example1(), None)
            .await
            .unwrap()
            .inserted_id
            .as_object_id()
            .unwrap()
            .into();

        let specs = json!([
            {
                "question_text": "Who is most likely to break the build?",
                "is_active": true,
            },
        ]);
        client
            .post(uri!(import_questions))
            .header(ContentType::JSON)
            .body(specs.to_string())
            .dispatch()
            .await;

        let previous = Coll::<Question>::from_db(&db)
            .find_one(existing.as_doc(), None)
            .await
            .unwrap()
            .unwrap();
        assert!(!previous.is_active);
    }

    async fn body_json(body: Option<String>) -> Value {
        serde_json::from_str(&body.unwrap()).unwrap()
    }

    async fn create(client: &Client, request: &CreateSessionRequest) -> SessionId {
        let response = client
            .post(uri!(create_session))
            .header(ContentType::JSON)
            .body(serde_json::to_string(request).unwrap())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        let body = body_json(response.into_string().await).await;
        assert_eq!(json!(true), body["success"]);
        assert_eq!(json!("Session created successfully"), body["message"]);
        u32::try_from(body["session_id"].as_u64().unwrap()).unwrap()
    }

    async fn start(client: &Client, session_id: SessionId) {
        let response = client.post(uri!(start_session(session_id))).dispatch().await;
        assert_eq!(Status::Ok, response.status());

        let body = body_json(response.into_string().await).await;
        assert_eq!(json!("Session started successfully"), body["message"]);
    }

    async fn activate(client: &Client, session_id: SessionId, question_id: Id) -> Value {
        let response = client
            .post(uri!(activate_question(session_id, question_id)))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        body_json(response.into_string().await).await
    }

    async fn status_of(db: &Database, session_id: SessionId) -> SessionState {
        Coll::<Session>::from_db(db)
            .find_one(session_id_filter(session_id), None)
            .await
            .unwrap()
            .unwrap()
            .status
    }

    async fn session_questions_of(db: &Database, session_id: SessionId) -> Vec<SessionQuestion> {
        let options = FindOptions::builder().sort(doc! { "question_order": 1 }).build();
        Coll::<SessionQuestion>::from_db(db)
            .find(doc! { "session": i64::from(session_id) }, options)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap()
    }

    async fn count_votes(db: &Database, session_id: SessionId) -> u64 {
        Coll::<Vote>::from_db(db)
            .count_documents(doc! { "session": i64::from(session_id) }, None)
            .await
            .unwrap()
    }
}
