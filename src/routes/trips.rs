use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Redirect,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use lettre::Address;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, services::workflow::CreateTrip, state::AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/trips", post(create_trip))
        .route("/trips/:trip_id/confirm", get(confirm_trip))
}

#[derive(Deserialize)]
struct CreateTripBody {
    destination: String,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    owner_name: String,
    owner_email: String,
    #[serde(default)]
    emails_to_invite: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatedTrip {
    trip_id: String,
}

async fn create_trip(
    State(state): State<AppState>,
    Json(body): Json<CreateTripBody>,
) -> Result<(StatusCode, Json<CreatedTrip>), AppError> {
    let owner_email = normalize_email(&body.owner_email)?;
    let emails_to_invite = body
        .emails_to_invite
        .iter()
        .map(|email| normalize_email(email))
        .collect::<Result<Vec<_>, _>>()?;

    let trip_id = state
        .trips
        .create_trip(CreateTrip {
            destination: body.destination,
            starts_at: body.starts_at,
            ends_at: body.ends_at,
            owner_name: body.owner_name,
            owner_email,
            emails_to_invite,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(CreatedTrip { trip_id })))
}

async fn confirm_trip(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
) -> Result<Redirect, AppError> {
    let confirmation = state.trips.confirm_trip(&trip_id.to_string()).await?;
    Ok(Redirect::to(
        &state.trips.links().trip_page(&confirmation.trip_id),
    ))
}

fn normalize_email(raw: &str) -> Result<String, AppError> {
    let address: Address = raw
        .trim()
        .parse()
        .map_err(|err| AppError::BadRequest(format!("invalid email {raw:?}: {err}")))?;
    Ok(address.to_string())
}
