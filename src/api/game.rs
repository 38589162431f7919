use std::collections::HashMap;

use chrono::Utc;
use mongodb::bson::doc;
use mongodb::error::{ErrorKind, WriteFailure};
use rocket::{futures::TryStreamExt, serde::json::Json, Route};
use serde::Serialize;

use crate::api::common;
use crate::error::Result;
use crate::model::{
    api::{
        fingerprint::VoterFingerprint,
        response::Envelope,
        session::{
            ActiveSessionPayload, CumulativeResultsPayload, ResultsPayload, TallyRow,
            VoteRequest, VoteStatusPayload,
        },
    },
    common::{QuestionSpec, SessionId},
    db::{
        question::Question,
        session::{ActiveSessionPointer, Session},
        session_participant::SessionParticipant,
        settings::GameSettings,
        vote::{NewVote, Vote},
    },
    mongodb::{Coll, Id},
};

pub fn routes() -> Vec<Route> {
    routes![
        get_questions,
        get_active_session,
        submit_vote,
        vote_status,
        get_results,
        get_cumulative_results,
    ]
}

#[derive(Serialize)]
struct QuestionsPayload {
    questions: Vec<QuestionSpec>,
}

/// The questions available for provisioning sessions.
#[get("/game/questions")]
async fn get_questions(settings: Coll<GameSettings>) -> Result<Json<Envelope<QuestionsPayload>>> {
    let settings = GameSettings::load(&settings).await?;
    Ok(Json(Envelope::success(QuestionsPayload {
        questions: settings.available_questions(),
    })))
}

/// The active session with its current question and participant roster,
/// polled by game clients.
#[get("/game/active")]
async fn get_active_session(
    pointers: Coll<ActiveSessionPointer>,
    sessions: Coll<Session>,
    questions: Coll<Question>,
    participants: Coll<SessionParticipant>,
) -> Result<Json<Envelope<ActiveSessionPayload>>> {
    let session = match common::active_session(&pointers, &sessions).await? {
        Some(session) => session,
        None => return Ok(Json(Envelope::rejected("No active session found"))),
    };

    let question = match session.current_question {
        Some(question_id) => questions.find_one(question_id.as_doc(), None).await?,
        None => None,
    };
    let participants = common::session_participants(&participants, session.id).await?;

    let payload = ActiveSessionPayload {
        time_remaining: session.time_remaining(),
        voting_open: session.is_voting_open(),
        question: question.as_ref().map(Into::into),
        participants: participants.iter().map(Into::into).collect(),
        session: (&session).into(),
    };
    Ok(Json(Envelope::success(payload)))
}

/// Cast a vote for a participant on the active session's current question.
///
/// Preconditions are checked in a fixed order so the caller always gets the
/// most relevant rejection: session, question, deadline, participant,
/// duplicate. The unique vote index turns a racing duplicate insert into the
/// same rejection the application-level check produces.
#[post("/game/vote", data = "<request>", format = "json")]
async fn submit_vote(
    request: Json<VoteRequest>,
    fingerprint: VoterFingerprint,
    pointers: Coll<ActiveSessionPointer>,
    sessions: Coll<Session>,
    participants: Coll<SessionParticipant>,
    votes: Coll<Vote>,
    new_votes: Coll<NewVote>,
) -> Result<Json<Envelope>> {
    let session = match common::active_session(&pointers, &sessions).await? {
        Some(session) => session,
        None => return Ok(Json(Envelope::rejected("No active session found"))),
    };

    let question_id = match session.current_question {
        Some(question_id) => question_id,
        None => return Ok(Json(Envelope::rejected("No active question in session"))),
    };

    if !session.accepts_votes_at(Utc::now()) {
        return Ok(Json(Envelope::rejected("Voting time has expired")));
    }

    let participant_id: Id = request.participant.into();
    let in_session = doc! {
        "_id": participant_id,
        "session": i64::from(session.id),
    };
    if participants.find_one(in_session, None).await?.is_none() {
        return Ok(Json(Envelope::rejected("Invalid participant for this session")));
    }

    let already_voted = doc! {
        "session": i64::from(session.id),
        "question": question_id,
        "voter_fingerprint": fingerprint.as_str(),
    };
    if votes.find_one(already_voted, None).await?.is_some() {
        return Ok(Json(Envelope::rejected("You have already voted for this question!")));
    }

    let vote = NewVote::new(session.id, question_id, participant_id, fingerprint.to_string());
    match new_votes.insert_one(&vote, None).await {
        Ok(_) => Ok(Json(Envelope::message("Vote submitted successfully!"))),
        // A duplicate that slipped past the check above and hit the unique index.
        Err(err) => match *err.kind {
            ErrorKind::Write(WriteFailure::WriteError(ref write_err))
                if write_err.code == 11000 =>
            {
                Ok(Json(Envelope::rejected("You have already voted for this question!")))
            }
            _ => Err(err.into()),
        },
    }
}

/// Whether this client has already voted on the current question.
#[get("/game/vote/status")]
async fn vote_status(
    fingerprint: VoterFingerprint,
    pointers: Coll<ActiveSessionPointer>,
    sessions: Coll<Session>,
    votes: Coll<Vote>,
) -> Result<Json<Envelope<VoteStatusPayload>>> {
    let not_voted = VoteStatusPayload {
        has_voted: false,
        voted_participant: None,
    };

    let session = match common::active_session(&pointers, &sessions).await? {
        Some(session) => session,
        None => return Ok(Json(Envelope::success(not_voted))),
    };
    let question_id = match session.current_question {
        Some(question_id) => question_id,
        None => return Ok(Json(Envelope::success(not_voted))),
    };

    let filter = doc! {
        "session": i64::from(session.id),
        "question": question_id,
        "voter_fingerprint": fingerprint.as_str(),
    };
    let payload = match votes.find_one(filter, None).await? {
        Some(vote) => VoteStatusPayload {
            has_voted: true,
            voted_participant: Some(vote.participant.into()),
        },
        None => not_voted,
    };
    Ok(Json(Envelope::success(payload)))
}

/// Tallies for the active session's current question, including zero-count
/// participants, in display order.
#[get("/game/results")]
async fn get_results(
    pointers: Coll<ActiveSessionPointer>,
    sessions: Coll<Session>,
    questions: Coll<Question>,
    participants: Coll<SessionParticipant>,
    votes: Coll<Vote>,
) -> Result<Json<Envelope<ResultsPayload>>> {
    let session = match common::active_session(&pointers, &sessions).await? {
        Some(session) => session,
        None => return Ok(Json(Envelope::rejected("No active session found"))),
    };
    let question_id = match session.current_question {
        Some(question_id) => question_id,
        None => return Ok(Json(Envelope::rejected("No active question in session"))),
    };

    let question = questions.find_one(question_id.as_doc(), None).await?;
    let participants = common::session_participants(&participants, session.id).await?;

    let filter = doc! {
        "session": i64::from(session.id),
        "question": question_id,
    };
    let question_votes: Vec<Vote> = votes.find(filter, None).await?.try_collect().await?;
    let (results, total_votes) = tally_rows(&participants, &question_votes);

    let payload = ResultsPayload {
        question: question.as_ref().map(Into::into),
        session: (&session).into(),
        results,
        total_votes,
    };
    Ok(Json(Envelope::success(payload)))
}

/// Whole-session tallies across all questions, most-voted participant first.
#[get("/game/results/cumulative?<session_id>")]
async fn get_cumulative_results(
    session_id: Option<SessionId>,
    pointers: Coll<ActiveSessionPointer>,
    sessions: Coll<Session>,
    participants: Coll<SessionParticipant>,
    votes: Coll<Vote>,
) -> Result<Json<Envelope<CumulativeResultsPayload>>> {
    let session = match session_id {
        Some(session_id) => common::session_by_id(&sessions, session_id).await?,
        None => match common::active_session(&pointers, &sessions).await? {
            Some(session) => session,
            None => return Ok(Json(Envelope::rejected("No active session found"))),
        },
    };

    let participants = common::session_participants(&participants, session.id).await?;

    let filter = doc! { "session": i64::from(session.id) };
    let session_votes: Vec<Vote> = votes
        .find(filter.clone(), None)
        .await?
        .try_collect()
        .await?;
    let (mut results, total_votes) = tally_rows(&participants, &session_votes);
    results.sort_by(|a, b| {
        b.vote_count
            .cmp(&a.vote_count)
            .then_with(|| a.participant_name.cmp(&b.participant_name))
    });

    let questions_count = votes.distinct("question", filter, None).await?.len() as u64;

    let payload = CumulativeResultsPayload {
        session: session.into(),
        results,
        total_votes,
        questions_count,
    };
    Ok(Json(Envelope::success(payload)))
}

/// Count votes per participant, producing one row per participant in the
/// order given, with zero counts included.
///
/// The total is the sum of the row counts, so votes for participants no
/// longer on the roster contribute to neither a row nor the total.
fn tally_rows(participants: &[SessionParticipant], votes: &[Vote]) -> (Vec<TallyRow>, u64) {
    let mut counts: HashMap<Id, u64> = HashMap::new();
    for vote in votes {
        *counts.entry(vote.participant).or_default() += 1;
    }
    let rows: Vec<TallyRow> = participants
        .iter()
        .map(|participant| TallyRow {
            id: participant.id.into(),
            participant_name: participant.participant_name.clone(),
            team: participant.team.clone(),
            vote_count: counts.get(&participant.id).copied().unwrap_or(0),
        })
        .collect();
    let total = rows.iter().map(|row| row.vote_count).sum();
    (rows, total)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use mongodb::{bson::DateTime, options::UpdateOptions, Database};
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::{serde_json, serde_json::json, Value},
    };

    use crate::model::{
        common::SessionState,
        db::{
            question::NewQuestion,
            session_participant::NewSessionParticipant,
            session_question::NewSessionQuestion,
        },
    };

    use super::*;

    #[backend_test]
    async fn questions_fall_back_to_samples(client: Client) {
        let response = client.get(uri!(get_questions)).dispatch().await;
        assert_eq!(Status::Ok, response.status());

        let body = body_json(response.into_string().await).await;
        assert_eq!(json!(true), body["success"]);
        let questions = body["questions"].as_array().unwrap();
        assert!(!questions.is_empty());
        assert_eq!(json!("Q1"), questions[0]["name"]);
    }

    #[backend_test]
    async fn no_active_session(client: Client) {
        let response = client.get(uri!(get_active_session)).dispatch().await;
        assert_eq!(Status::Ok, response.status());

        let body = body_json(response.into_string().await).await;
        assert_eq!(json!(false), body["success"]);
        assert_eq!(json!("No active session found"), body["message"]);

        // Voting against no session gets the same rejection.
        let response = client
            .post(uri!(submit_vote))
            .header(ContentType::JSON)
            .body(json!({ "participant": Id::new().to_string() }).to_string())
            .dispatch()
            .await;
        let body = body_json(response.into_string().await).await;
        assert_eq!(json!("No active session found"), body["message"]);
    }

    #[backend_test]
    async fn active_session_payload(client: Client, db: Database) {
        let (session, question, participants) = insert_active_session(&db).await;

        let response = client.get(uri!(get_active_session)).dispatch().await;
        assert_eq!(Status::Ok, response.status());

        let body = body_json(response.into_string().await).await;
        assert_eq!(json!(true), body["success"]);
        assert_eq!(json!(session.id), body["session"]["id"]);
        assert_eq!(json!(question.question_text), body["question"]["question_text"]);
        assert_eq!(json!(true), body["voting_open"]);
        assert!(body["time_remaining"].as_i64().unwrap() > 0);

        // Participants come back in display order.
        let names: Vec<&str> = body["participants"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["participant_name"].as_str().unwrap())
            .collect();
        let expected: Vec<&str> = participants
            .iter()
            .map(|p| p.participant_name.as_str())
            .collect();
        assert_eq!(expected, names);
    }

    #[backend_test]
    async fn vote_and_duplicate(client: Client, db: Database) {
        let (_, _, participants) = insert_active_session(&db).await;
        let target = &participants[0];

        // First vote goes through.
        let body = vote(&client, *target.id).await;
        assert_eq!(json!(true), body["success"]);
        assert_eq!(json!("Vote submitted successfully!"), body["message"]);

        // Status now reflects the vote.
        let response = client.get(uri!(vote_status)).dispatch().await;
        let body = body_json(response.into_string().await).await;
        assert_eq!(json!(true), body["has_voted"]);
        assert_eq!(json!(target.id.to_string()), body["voted_participant"]);

        // Same client voting again is rejected, even for a different target.
        let body = vote(&client, *participants[1].id).await;
        assert_eq!(json!(false), body["success"]);
        assert_eq!(json!("You have already voted for this question!"), body["message"]);
    }

    #[backend_test]
    async fn vote_after_deadline(client: Client, db: Database) {
        let (session, _, participants) = insert_active_session(&db).await;

        // Push the deadline into the past, beyond the grace period.
        let expired = Utc::now() - Duration::seconds(10);
        Coll::<Session>::from_db(&db)
            .update_one(
                crate::model::mongodb::session_id_filter(session.id),
                doc! { "$set": { "voting_deadline": DateTime::from_chrono(expired) } },
                None,
            )
            .await
            .unwrap();

        let body = vote(&client, *participants[0].id).await;
        assert_eq!(json!(false), body["success"]);
        assert_eq!(json!("Voting time has expired"), body["message"]);
    }

    #[backend_test]
    async fn vote_for_unknown_participant(client: Client, db: Database) {
        insert_active_session(&db).await;

        let body = vote(&client, *Id::new()).await;
        assert_eq!(json!(false), body["success"]);
        assert_eq!(json!("Invalid participant for this session"), body["message"]);
    }

    #[backend_test]
    async fn results_include_zero_counts(client: Client, db: Database) {
        let (_, _, participants) = insert_active_session(&db).await;

        let body = vote(&client, *participants[1].id).await;
        assert_eq!(json!(true), body["success"]);

        let response = client.get(uri!(get_results)).dispatch().await;
        let body = body_json(response.into_string().await).await;
        assert_eq!(json!(true), body["success"]);
        assert_eq!(json!(1), body["total_votes"]);

        // Every participant appears, in display order, zero counts included.
        let results = body["results"].as_array().unwrap();
        assert_eq!(participants.len(), results.len());
        let counts: Vec<u64> = results
            .iter()
            .map(|row| row["vote_count"].as_u64().unwrap())
            .collect();
        assert_eq!(vec![0, 1, 0], counts);
    }

    #[backend_test]
    async fn vote_for_participant_of_other_session(client: Client, db: Database) {
        insert_active_session(&db).await;

        // A perfectly real participant, but belonging to a different session.
        let other = Coll::<NewSessionParticipant>::from_db(&db)
            .insert_one(
                NewSessionParticipant::new(2, "Zoe Zookeeper".into(), "Ops".into(), 1),
                None,
            )
            .await
            .unwrap()
            .inserted_id
            .as_object_id()
            .unwrap();

        let body = vote(&client, other).await;
        assert_eq!(json!(false), body["success"]);
        assert_eq!(json!("Invalid participant for this session"), body["message"]);
    }

    #[backend_test]
    async fn totals_exclude_votes_for_removed_participants(client: Client, db: Database) {
        let (session, question, participants) = insert_active_session(&db).await;

        // One roster vote plus one whose participant has since left the roster.
        let votes = vec![
            NewVote::new(session.id, question.id, participants[0].id, "10.0.0.1_1".into()),
            NewVote::new(session.id, question.id, Id::new(), "10.0.0.2_1".into()),
        ];
        Coll::<NewVote>::from_db(&db)
            .insert_many(&votes, None)
            .await
            .unwrap();

        // The orphaned vote appears in no row, so it must not count either.
        let response = client.get(uri!(get_results)).dispatch().await;
        let body = body_json(response.into_string().await).await;
        assert_eq!(json!(true), body["success"]);
        assert_eq!(json!(1), body["total_votes"]);
        let sum: u64 = body["results"]
            .as_array()
            .unwrap()
            .iter()
            .map(|row| row["vote_count"].as_u64().unwrap())
            .sum();
        assert_eq!(1, sum);

        // Same for the whole-session view.
        let response = client
            .get(format!("/game/results/cumulative?session_id={}", session.id))
            .dispatch()
            .await;
        let body = body_json(response.into_string().await).await;
        assert_eq!(json!(1), body["total_votes"]);
    }

    #[backend_test]
    async fn one_vote_each_from_three_voters(client: Client, db: Database) {
        let (session, question, participants) = insert_active_session(&db).await;

        // Three distinct fingerprints, one vote per participant.
        let votes: Vec<NewVote> = participants
            .iter()
            .enumerate()
            .map(|(index, participant)| {
                NewVote::new(
                    session.id,
                    question.id,
                    participant.id,
                    format!("10.0.0.{}_1", index),
                )
            })
            .collect();
        Coll::<NewVote>::from_db(&db)
            .insert_many(&votes, None)
            .await
            .unwrap();

        let response = client.get(uri!(get_results)).dispatch().await;
        let body = body_json(response.into_string().await).await;
        assert_eq!(json!(true), body["success"]);
        assert_eq!(json!(3), body["total_votes"]);

        let counts: Vec<u64> = body["results"]
            .as_array()
            .unwrap()
            .iter()
            .map(|row| row["vote_count"].as_u64().unwrap())
            .collect();
        assert_eq!(vec![1, 1, 1], counts);
    }

    #[backend_test]
    async fn cumulative_results_ordering(client: Client, db: Database) {
        let (session, question, participants) = insert_active_session(&db).await;

        // A second question with two more votes for participant 1, plus one
        // for participant 0 on the current question, from distinct voters.
        let other_question: Id = Coll::<NewQuestion>::from_db(&db)
            .insert_one(NewQuestion::example2(), None)
            .await
            .unwrap()
            .inserted_id
            .as_object_id()
            .unwrap()
            .into();
        let votes = vec![
            NewVote::new(session.id, question.id, participants[0].id, "10.0.0.1_17".into()),
            NewVote::new(session.id, other_question, participants[1].id, "10.0.0.1_17".into()),
            NewVote::new(session.id, other_question, participants[1].id, "10.0.0.2_99".into()),
        ];
        Coll::<NewVote>::from_db(&db)
            .insert_many(&votes, None)
            .await
            .unwrap();

        let response = client
            .get(format!("/game/results/cumulative?session_id={}", session.id))
            .dispatch()
            .await;
        let body = body_json(response.into_string().await).await;
        assert_eq!(json!(true), body["success"]);
        assert_eq!(json!(3), body["total_votes"]);
        assert_eq!(json!(2), body["questions_count"]);

        // Most-voted first, ties broken by name.
        let results = body["results"].as_array().unwrap();
        assert_eq!(
            participants[1].participant_name,
            results[0]["participant_name"].as_str().unwrap()
        );
        assert_eq!(json!(2), results[0]["vote_count"]);
        assert_eq!(json!(1), results[1]["vote_count"]);
    }

    #[backend_test]
    async fn cumulative_results_unknown_session(client: Client) {
        let response = client
            .get("/game/results/cumulative?session_id=999")
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());

        let body = body_json(response.into_string().await).await;
        assert_eq!(json!(false), body["success"]);
        assert_eq!(json!("Session not found"), body["message"]);
    }

    #[backend_test]
    async fn vote_status_without_active_question(client: Client) {
        let response = client.get(uri!(vote_status)).dispatch().await;
        assert_eq!(Status::Ok, response.status());

        let body = body_json(response.into_string().await).await;
        assert_eq!(json!(true), body["success"]);
        assert_eq!(json!(false), body["has_voted"]);
    }

    async fn body_json(body: Option<String>) -> Value {
        serde_json::from_str(&body.unwrap()).unwrap()
    }

    async fn vote(client: &Client, participant: mongodb::bson::oid::ObjectId) -> Value {
        let response = client
            .post(uri!(submit_vote))
            .header(ContentType::JSON)
            .body(json!({ "participant": participant.to_string() }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        body_json(response.into_string().await).await
    }

    /// Insert a full active session: one current question with a live timer,
    /// three participants, and the pointer set.
    async fn insert_active_session(
        db: &Database,
    ) -> (Session, Question, Vec<SessionParticipant>) {
        let question_id: Id = Coll::<NewQuestion>::from_db(db)
            .insert_one(NewQuestion::example1(), None)
            .await
            .unwrap()
            .inserted_id
            .as_object_id()
            .unwrap()
            .into();
        let question = Coll::<Question>::from_db(db)
            .find_one(question_id.as_doc(), None)
            .await
            .unwrap()
            .unwrap();

        let mut session = Session::example(1);
        session.status = SessionState::Active;
        session.current_question = Some(question_id);
        session.question_start_time = Some(Utc::now());
        session.voting_deadline = Some(Utc::now() + Duration::seconds(30));
        Coll::<Session>::from_db(db)
            .insert_one(&session, None)
            .await
            .unwrap();
        Coll::<NewSessionQuestion>::from_db(db)
            .insert_one(NewSessionQuestion::new(session.id, question_id, 1), None)
            .await
            .unwrap();

        let new_participants = vec![
            NewSessionParticipant::new(session.id, "Alex Backend".into(), "Backend".into(), 1),
            NewSessionParticipant::new(session.id, "Mike DevOps".into(), "DevOps".into(), 2),
            NewSessionParticipant::new(session.id, "Sarah Security".into(), "Security".into(), 3),
        ];
        Coll::<NewSessionParticipant>::from_db(db)
            .insert_many(&new_participants, None)
            .await
            .unwrap();

        let options = UpdateOptions::builder().upsert(true).build();
        Coll::<ActiveSessionPointer>::from_db(db)
            .update_one(
                ActiveSessionPointer::filter(),
                doc! { "$set": { "session": i64::from(session.id) } },
                options,
            )
            .await
            .unwrap();

        let participants =
            common::session_participants(&Coll::from_db(db), session.id).await.unwrap();
        (session, question, participants)
    }
}
