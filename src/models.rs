use serde::{Deserialize, Serialize};
use crate::auth::Actor;
use crate::schema::{bookings, events, slot_allocations, slots};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use diesel::{deserialize::{self, FromSql}, pg::{Pg, PgValue}, serialize::{self, Output, ToSql}, sql_types::Text, Insertable, Selectable};

#[derive(Debug, Clone, Queryable, Serialize, Deserialize, Selectable)]
#[diesel(table_name = events)]
pub struct Event {
    pub event_id: i32,
    pub title: String,
    pub description: Option<String>,
    pub banner_url: Option<String>,
    pub event_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub slot_minutes: i32,
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = events)]
pub struct NewEvent {
    pub title: String,
    pub description: Option<String>,
    pub banner_url: Option<String>,
    pub event_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub slot_minutes: i32,
}

#[derive(Debug, Clone, Queryable, Serialize, Deserialize, Selectable)]
#[diesel(table_name = slots)]
pub struct Slot {
    pub slot_id: i32,
    pub event_id: i32,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = slots)]
pub struct NewSlot {
    pub event_id: i32,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Serialize, Deserialize, Selectable)]
#[diesel(table_name = slot_allocations)]
pub struct SlotAllocation {
    pub allocation_id: i32,
    pub slot_id: i32,
    pub company_name: String,
    pub sector: Option<String>,
    pub interviewer: Option<String>,
    pub stand: Option<String>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = slot_allocations)]
pub struct NewAllocation {
    pub slot_id: i32,
    pub company_name: String,
    pub sector: Option<String>,
    pub interviewer: Option<String>,
    pub stand: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = crate::schema::sql_types::BookingStatus)]
pub enum BookingStatus {
    PENDING,
    CONFIRMED,
    REJECTED,
}

impl ToSql<crate::schema::sql_types::BookingStatus, Pg> for BookingStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        let s = match *self {
            BookingStatus::PENDING => "PENDING",
            BookingStatus::CONFIRMED => "CONFIRMED",
            BookingStatus::REJECTED => "REJECTED",
        };
        <str as ToSql<Text, Pg>>::to_sql(s, out)
    }
}

impl FromSql<crate::schema::sql_types::BookingStatus, Pg> for BookingStatus {
    fn from_sql(bytes: PgValue) -> deserialize::Result<Self> {
        match <String as FromSql<Text, Pg>>::from_sql(bytes)?.as_str() {
            "PENDING" => Ok(BookingStatus::PENDING),
            "CONFIRMED" => Ok(BookingStatus::CONFIRMED),
            "REJECTED" => Ok(BookingStatus::REJECTED),
            s => Err(format!("Unrecognized booking status: {}", s).into()),
        }
    }
}

#[derive(Debug, Clone, Queryable, Serialize, Deserialize, Selectable)]
#[diesel(table_name = bookings)]
pub struct Booking {
    pub booking_id: i32,
    pub allocation_id: i32,
    pub candidate_id: String,
    pub status: BookingStatus,
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = bookings)]
pub struct NewBooking {
    pub allocation_id: i32,
    pub candidate_id: String,
    pub status: BookingStatus,
}

// Request/Response models for API

#[derive(Debug, Clone, Deserialize)]
pub struct CreateEventRequest {
    pub actor: Actor,
    pub title: String,
    pub description: Option<String>,
    pub banner_url: Option<String>,
    pub date: String,
    pub start: String,
    pub end: String,
    pub slot_minutes: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateSlotsRequest {
    pub actor: Actor,
    // Re-generation appends; the caller has to acknowledge duplicates.
    #[serde(default)]
    pub confirm_append: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateSlotRequest {
    pub actor: Actor,
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActorOnlyRequest {
    pub actor: Actor,
}

// Company self-service claims take the company name from the actor, never
// from a free-form field.
#[derive(Debug, Clone, Deserialize)]
pub struct ClaimSlotRequest {
    pub actor: Actor,
    pub slot_id: i32,
    pub interviewer: String,
    pub sector: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssignSlotRequest {
    pub actor: Actor,
    pub slot_id: i32,
    pub company_name: String,
    pub interviewer: Option<String>,
    pub sector: Option<String>,
    pub stand: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClaimRangeRequest {
    pub actor: Actor,
    pub range_start: String,
    pub range_end: String,
    pub interviewer: String,
    pub sector: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssignRangeRequest {
    pub actor: Actor,
    pub range_start: String,
    pub range_end: String,
    pub company_name: String,
    pub interviewer: Option<String>,
    pub sector: Option<String>,
    pub stand: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateStandRequest {
    pub actor: Actor,
    pub stand: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBookingRequest {
    pub actor: Actor,
    pub allocation_id: i32,
    pub company_email: Option<String>,
    pub candidate_name: Option<String>,
    pub cv_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewBookingRequest {
    pub actor: Actor,
    pub booking_id: i32,
    pub status: BookingStatus,
    pub candidate_email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelBookingRequest {
    pub actor: Actor,
    pub booking_id: i32,
}

#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub booking_id: i32,
    pub status: BookingStatus,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct AllocationView {
    pub allocation: SlotAllocation,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
    pub active_bookings: i64,
    pub full: bool,
}

#[derive(Debug, Serialize)]
pub struct CandidateBookingView {
    pub booking_id: i32,
    pub status: BookingStatus,
    pub company_name: String,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Serialize)]
pub struct PendingBookingView {
    pub booking_id: i32,
    pub allocation_id: i32,
    pub candidate_id: String,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub message: String,
}
