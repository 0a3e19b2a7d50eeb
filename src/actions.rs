use diesel::prelude::*;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use crate::auth::Forbidden;
use crate::models::{self, BookingStatus};
use crate::report::ReportRow;
use crate::scheduling::{self, MAX_ACTIVE_BOOKINGS};

type DbError = Box<dyn std::error::Error + Send + Sync>;

/// Outcomes of the booking workflow that the API maps to 409. These are
/// matched by type (`downcast_ref`), never by message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowError {
    /// The requested slot overlaps one of the candidate's active bookings.
    ScheduleConflict,
    /// The allocation already carries the maximum of active bookings.
    CapacityFull,
    /// The candidate already requested this allocation.
    DuplicateRequest,
}

impl std::fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowError::ScheduleConflict => {
                write!(f, "requested slot overlaps an existing booking")
            }
            WorkflowError::CapacityFull => write!(f, "allocation has no remaining capacity"),
            WorkflowError::DuplicateRequest => {
                write!(f, "candidate already requested this company")
            }
        }
    }
}

impl std::error::Error for WorkflowError {}

pub fn parse_date(s: &str) -> Result<NaiveDate, DbError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| format!("'{}' is not a valid date (expected YYYY-MM-DD)", s).into())
}

pub fn parse_time(s: &str) -> Result<NaiveTime, DbError> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|_| format!("'{}' is not a valid time (expected HH:MM)", s).into())
}

pub fn parse_datetime(s: &str) -> Result<NaiveDateTime, DbError> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M"))
        .map_err(|_| format!("'{}' is not a valid timestamp (expected YYYY-MM-DD HH:MM)", s).into())
}

pub fn create_event(
    conn: &mut PgConnection,
    form: &models::CreateEventRequest,
) -> Result<models::Event, DbError> {
    use crate::schema::events::dsl::events;

    if form.title.trim().is_empty() {
        return Err("title is required".into());
    }

    let event_date = parse_date(&form.date)?;
    let start_time = parse_time(&form.start)?;
    let end_time = parse_time(&form.end)?;

    if end_time <= start_time {
        return Err("end time must be after start time".into());
    }

    if !scheduling::is_allowed_duration(form.slot_minutes) {
        return Err("slot duration must be one of 15, 20, 30 or 60 minutes".into());
    }

    let new_event = models::NewEvent {
        title: form.title.clone(),
        description: form.description.clone(),
        banner_url: form.banner_url.clone(),
        event_date,
        start_time,
        end_time,
        slot_minutes: form.slot_minutes,
    };

    let event = diesel::insert_into(events)
        .values(&new_event)
        .get_result::<models::Event>(conn)?;

    Ok(event)
}

pub fn list_events(conn: &mut PgConnection) -> Result<Vec<models::Event>, DbError> {
    use crate::schema::events::dsl::{event_date, events, start_time};

    let all = events
        .order((event_date.asc(), start_time.asc()))
        .load::<models::Event>(conn)?;

    Ok(all)
}

pub fn get_event(conn: &mut PgConnection, id: i32) -> Result<models::Event, DbError> {
    use crate::schema::events::dsl::events;

    let event = events.find(id).first::<models::Event>(conn)?;

    Ok(event)
}

/// Tiles the event window and bulk-inserts the slots. Re-invocation appends to
/// whatever is already there; when slots exist the caller must have confirmed
/// that duplicates are acceptable.
pub fn generate_slots(
    conn: &mut PgConnection,
    event_id: i32,
    confirm_append: bool,
) -> Result<Vec<models::Slot>, DbError> {
    use crate::schema::slots::dsl::{event_id as slots_event_id, slots};

    let event = get_event(conn, event_id)?;

    let intervals = scheduling::tile_window(
        event.event_date,
        event.start_time,
        event.end_time,
        event.slot_minutes,
    );

    if intervals.is_empty() {
        return Err("slot duration is larger than the event window, no slots to generate".into());
    }

    conn.transaction(|conn| {
        let existing: i64 = slots
            .filter(slots_event_id.eq(event_id))
            .count()
            .get_result(conn)?;

        if existing > 0 && !confirm_append {
            return Err(
                "event already has slots; pass confirm_append to add duplicates anyway".into(),
            );
        }

        let new_slots = intervals
            .iter()
            .map(|(start, end)| models::NewSlot {
                event_id,
                start_at: *start,
                end_at: *end,
            })
            .collect::<Vec<_>>();

        let created = diesel::insert_into(slots)
            .values(&new_slots)
            .get_results::<models::Slot>(conn)?;

        Ok(created)
    })
}

pub fn list_slots(conn: &mut PgConnection, for_event: i32) -> Result<Vec<models::Slot>, DbError> {
    use crate::schema::slots::dsl::{event_id, slots, start_at};

    let all = slots
        .filter(event_id.eq(for_event))
        .order(start_at.asc())
        .load::<models::Slot>(conn)?;

    Ok(all)
}

pub fn update_slot(
    conn: &mut PgConnection,
    slot_id: i32,
    new_start: NaiveDateTime,
    new_end: NaiveDateTime,
) -> Result<models::Slot, DbError> {
    use crate::schema::slots::dsl::{end_at, slots, start_at};

    if new_end <= new_start {
        return Err("slot end must be after slot start".into());
    }

    let updated = diesel::update(slots.find(slot_id))
        .set((start_at.eq(new_start), end_at.eq(new_end)))
        .get_result::<models::Slot>(conn)?;

    Ok(updated)
}

/// Deletes one slot with its allocations and their bookings, atomically.
pub fn delete_slot(conn: &mut PgConnection, slot: i32) -> Result<(), DbError> {
    use crate::schema::{bookings, slot_allocations, slots};

    conn.transaction(|conn| {
        let allocation_ids: Vec<i32> = slot_allocations::table
            .filter(slot_allocations::slot_id.eq(slot))
            .select(slot_allocations::allocation_id)
            .load(conn)?;

        diesel::delete(
            bookings::table.filter(bookings::allocation_id.eq_any(&allocation_ids)),
        )
        .execute(conn)?;
        diesel::delete(slot_allocations::table.filter(slot_allocations::slot_id.eq(slot)))
            .execute(conn)?;
        let deleted = diesel::delete(slots::table.find(slot)).execute(conn)?;

        if deleted == 0 {
            return Err(diesel::result::Error::NotFound.into());
        }

        Ok(())
    })
}

/// Drops the whole slot structure under an event (allocations and bookings
/// included) while keeping the event itself. One transaction, so a partial
/// failure cannot orphan rows.
pub fn delete_event_slots(conn: &mut PgConnection, event: i32) -> Result<usize, DbError> {
    conn.transaction(|conn| delete_event_slots_inner(conn, event))
}

/// Cascading event removal: bookings, allocations, slots, then the event row,
/// in a single transaction.
pub fn delete_event(conn: &mut PgConnection, event: i32) -> Result<(), DbError> {
    use crate::schema::events;

    conn.transaction(|conn| {
        delete_event_slots_inner(conn, event)?;
        let deleted = diesel::delete(events::table.find(event)).execute(conn)?;

        if deleted == 0 {
            return Err(diesel::result::Error::NotFound.into());
        }

        Ok(())
    })
}

fn delete_event_slots_inner(conn: &mut PgConnection, event: i32) -> Result<usize, DbError> {
    use crate::schema::{bookings, slot_allocations, slots};

    let slot_ids: Vec<i32> = slots::table
        .filter(slots::event_id.eq(event))
        .select(slots::slot_id)
        .load(conn)?;

    let allocation_ids: Vec<i32> = slot_allocations::table
        .filter(slot_allocations::slot_id.eq_any(&slot_ids))
        .select(slot_allocations::allocation_id)
        .load(conn)?;

    diesel::delete(bookings::table.filter(bookings::allocation_id.eq_any(&allocation_ids)))
        .execute(conn)?;
    diesel::delete(slot_allocations::table.filter(slot_allocations::slot_id.eq_any(&slot_ids)))
        .execute(conn)?;
    let deleted = diesel::delete(slots::table.filter(slots::event_id.eq(event))).execute(conn)?;

    Ok(deleted)
}

/// Attaches one company to one slot. The company self-service path requires an
/// interviewer name; the admin assign path does not.
pub fn create_allocation(
    conn: &mut PgConnection,
    slot: i32,
    company: &str,
    interviewer: Option<&str>,
    sector: Option<&str>,
    stand: Option<&str>,
    require_interviewer: bool,
) -> Result<models::SlotAllocation, DbError> {
    use crate::schema::{slot_allocations::dsl::slot_allocations, slots::dsl::slots};

    if company.trim().is_empty() {
        return Err("company name is required".into());
    }
    if require_interviewer && interviewer.map_or(true, |i| i.trim().is_empty()) {
        return Err("interviewer name is required".into());
    }

    // Slot must exist; surfaces NotFound otherwise.
    let _slot = slots.find(slot).first::<models::Slot>(conn)?;

    let new_allocation = models::NewAllocation {
        slot_id: slot,
        company_name: company.trim().to_string(),
        sector: sector.map(|s| s.to_string()),
        interviewer: interviewer.map(|i| i.to_string()),
        stand: stand.map(|s| s.to_string()),
    };

    let created = diesel::insert_into(slot_allocations)
        .values(&new_allocation)
        .get_result::<models::SlotAllocation>(conn)?;

    Ok(created)
}

/// Bulk range claim: one allocation per slot of the event whose interval fits
/// inside `[range_start, range_end]`. With `exclude_already_claimed` the slots
/// this company already holds are skipped (company self-service path); the
/// admin assign path passes `false` and may double-assign freely.
pub fn create_allocations_for_range(
    conn: &mut PgConnection,
    event: i32,
    range_start: NaiveTime,
    range_end: NaiveTime,
    company: &str,
    interviewer: Option<&str>,
    sector: Option<&str>,
    stand: Option<&str>,
    exclude_already_claimed: bool,
) -> Result<Vec<models::SlotAllocation>, DbError> {
    use crate::schema::{slot_allocations, slots};

    if company.trim().is_empty() {
        return Err("company name is required".into());
    }
    if range_end <= range_start {
        return Err("range end must be after range start".into());
    }

    conn.transaction(|conn| {
        let event_slots = slots::table
            .filter(slots::event_id.eq(event))
            .order(slots::start_at.asc())
            .load::<models::Slot>(conn)?;

        let mut matched: Vec<i32> = event_slots
            .iter()
            .filter(|s| {
                scheduling::slot_in_range(s.start_at.time(), s.end_at.time(), range_start, range_end)
            })
            .map(|s| s.slot_id)
            .collect();

        if exclude_already_claimed {
            let already: Vec<i32> = slot_allocations::table
                .filter(slot_allocations::slot_id.eq_any(&matched))
                .filter(slot_allocations::company_name.eq(company.trim()))
                .select(slot_allocations::slot_id)
                .load(conn)?;
            matched.retain(|id| !already.contains(id));
        }

        if matched.is_empty() {
            return Err("no slots match the requested time range".into());
        }

        let new_allocations = matched
            .iter()
            .map(|slot_id| models::NewAllocation {
                slot_id: *slot_id,
                company_name: company.trim().to_string(),
                sector: sector.map(|s| s.to_string()),
                interviewer: interviewer.map(|i| i.to_string()),
                stand: stand.map(|s| s.to_string()),
            })
            .collect::<Vec<_>>();

        let created = diesel::insert_into(slot_allocations::table)
            .values(&new_allocations)
            .get_results::<models::SlotAllocation>(conn)?;

        Ok(created)
    })
}

pub fn update_stand(
    conn: &mut PgConnection,
    allocation: i32,
    new_stand: Option<&str>,
) -> Result<models::SlotAllocation, DbError> {
    use crate::schema::slot_allocations::dsl::{slot_allocations, stand};

    let updated = diesel::update(slot_allocations.find(allocation))
        .set(stand.eq(new_stand.map(|s| s.to_string())))
        .get_result::<models::SlotAllocation>(conn)?;

    Ok(updated)
}

/// Allocations of an event with their slot interval and current active-booking
/// count; `full` drives the client's "no more requests" display.
pub fn list_event_allocations(
    conn: &mut PgConnection,
    event: i32,
) -> Result<Vec<models::AllocationView>, DbError> {
    use crate::schema::{bookings, slot_allocations, slots};

    let rows: Vec<(models::SlotAllocation, models::Slot)> = slot_allocations::table
        .inner_join(slots::table)
        .filter(slots::event_id.eq(event))
        .order(slots::start_at.asc())
        .select((
            models::SlotAllocation::as_select(),
            models::Slot::as_select(),
        ))
        .load(conn)?;

    let allocation_ids: Vec<i32> = rows.iter().map(|(a, _)| a.allocation_id).collect();

    let counts: Vec<(i32, i64)> = bookings::table
        .filter(bookings::allocation_id.eq_any(&allocation_ids))
        .filter(bookings::status.ne(BookingStatus::REJECTED))
        .group_by(bookings::allocation_id)
        .select((bookings::allocation_id, diesel::dsl::count_star()))
        .load(conn)?;

    let views = rows
        .into_iter()
        .map(|(allocation, slot)| {
            let active = counts
                .iter()
                .find(|(id, _)| *id == allocation.allocation_id)
                .map(|(_, n)| *n)
                .unwrap_or(0);
            models::AllocationView {
                start_at: slot.start_at,
                end_at: slot.end_at,
                active_bookings: active,
                full: active >= MAX_ACTIVE_BOOKINGS,
                allocation,
            }
        })
        .collect();

    Ok(views)
}

/// Booking request. Capacity and overlap are re-validated inside one
/// transaction with the allocation row locked, so two racing requests cannot
/// both pass a stale check. Duplicate (candidate, allocation) pairs come back
/// from the unique constraint and are classified by error kind.
pub fn create_booking(
    conn: &mut PgConnection,
    allocation: i32,
    candidate: &str,
) -> Result<(models::Booking, models::SlotAllocation, models::Slot), DbError> {
    use crate::schema::{bookings, slot_allocations, slots};

    conn.transaction(|conn| {
        let target: models::SlotAllocation = slot_allocations::table
            .filter(slot_allocations::allocation_id.eq(allocation))
            .for_update()
            .first(conn)?;

        let slot: models::Slot = slots::table.find(target.slot_id).first(conn)?;

        let active: i64 = bookings::table
            .filter(bookings::allocation_id.eq(allocation))
            .filter(bookings::status.ne(BookingStatus::REJECTED))
            .count()
            .get_result(conn)?;

        if active >= MAX_ACTIVE_BOOKINGS {
            return Err(WorkflowError::CapacityFull.into());
        }

        // Any other active booking of this candidate whose slot interval
        // strictly overlaps the requested one. The target allocation itself is
        // excluded so a repeat request falls through to the unique constraint.
        let overlapping: Option<i32> = bookings::table
            .inner_join(slot_allocations::table.inner_join(slots::table))
            .filter(bookings::candidate_id.eq(candidate))
            .filter(bookings::status.ne(BookingStatus::REJECTED))
            .filter(bookings::allocation_id.ne(allocation))
            .filter(
                slots::start_at
                    .lt(slot.end_at)
                    .and(slots::end_at.gt(slot.start_at)),
            )
            .select(bookings::booking_id)
            .first(conn)
            .optional()?;

        if overlapping.is_some() {
            return Err(WorkflowError::ScheduleConflict.into());
        }

        let new_booking = models::NewBooking {
            allocation_id: allocation,
            candidate_id: candidate.to_string(),
            status: BookingStatus::PENDING,
        };

        let booking = match diesel::insert_into(bookings::table)
            .values(&new_booking)
            .get_result::<models::Booking>(conn)
        {
            Ok(b) => b,
            Err(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            )) => return Err(WorkflowError::DuplicateRequest.into()),
            Err(e) => return Err(e.into()),
        };

        Ok((booking, target, slot))
    })
}

/// Confirm or reject a pending request. Ownership is checked against the
/// allocation's company name inside the transaction, not by trusting whatever
/// the caller fetched; `None` is the admin bypass. Transitions are otherwise
/// unguarded; acting on a cancelled (deleted) booking surfaces NotFound.
pub fn review_booking(
    conn: &mut PgConnection,
    booking: i32,
    acting_company: Option<&str>,
    new_status: BookingStatus,
) -> Result<(models::Booking, models::SlotAllocation, models::Slot), DbError> {
    use crate::schema::{bookings, slot_allocations, slots};

    if new_status == BookingStatus::PENDING {
        return Err("status must be CONFIRMED or REJECTED".into());
    }

    conn.transaction(|conn| {
        let (current, allocation): (models::Booking, models::SlotAllocation) = bookings::table
            .inner_join(slot_allocations::table)
            .filter(bookings::booking_id.eq(booking))
            .select((
                models::Booking::as_select(),
                models::SlotAllocation::as_select(),
            ))
            .first(conn)?;

        if let Some(company) = acting_company {
            if allocation.company_name != company {
                return Err(Forbidden(format!(
                    "booking {} belongs to '{}'",
                    current.booking_id, allocation.company_name
                ))
                .into());
            }
        }

        let updated = diesel::update(bookings::table.find(booking))
            .set(bookings::status.eq(new_status))
            .get_result::<models::Booking>(conn)?;

        let slot: models::Slot = slots::table.find(allocation.slot_id).first(conn)?;

        Ok((updated, allocation, slot))
    })
}

/// Candidate cancellation: a plain row delete that frees capacity immediately.
/// No notification goes out.
pub fn cancel_booking(
    conn: &mut PgConnection,
    booking: i32,
    candidate: &str,
) -> Result<(), DbError> {
    use crate::schema::bookings::dsl::bookings;

    conn.transaction(|conn| {
        let current = bookings.find(booking).first::<models::Booking>(conn)?;

        if current.candidate_id != candidate {
            return Err(Forbidden(format!(
                "booking {} belongs to another candidate",
                booking
            ))
            .into());
        }

        diesel::delete(bookings.find(booking)).execute(conn)?;

        Ok(())
    })
}

pub fn list_candidate_bookings(
    conn: &mut PgConnection,
    candidate: &str,
) -> Result<Vec<models::CandidateBookingView>, DbError> {
    use crate::schema::{bookings, slot_allocations, slots};

    let rows: Vec<(i32, BookingStatus, String, NaiveDateTime, NaiveDateTime, Option<NaiveDateTime>)> =
        bookings::table
            .inner_join(slot_allocations::table.inner_join(slots::table))
            .filter(bookings::candidate_id.eq(candidate))
            .order(slots::start_at.asc())
            .select((
                bookings::booking_id,
                bookings::status,
                slot_allocations::company_name,
                slots::start_at,
                slots::end_at,
                bookings::created_at,
            ))
            .load(conn)?;

    let views = rows
        .into_iter()
        .map(
            |(booking_id, status, company_name, start_at, end_at, created_at)| {
                models::CandidateBookingView {
                    booking_id,
                    status,
                    company_name,
                    start_at,
                    end_at,
                    created_at,
                }
            },
        )
        .collect();

    Ok(views)
}

/// Pending requests against a company's allocations in one event: the review
/// inbox.
pub fn list_pending_for_company(
    conn: &mut PgConnection,
    event: i32,
    company: &str,
) -> Result<Vec<models::PendingBookingView>, DbError> {
    use crate::schema::{bookings, slot_allocations, slots};

    let rows: Vec<(i32, i32, String, NaiveDateTime, NaiveDateTime, Option<NaiveDateTime>)> =
        bookings::table
            .inner_join(slot_allocations::table.inner_join(slots::table))
            .filter(slots::event_id.eq(event))
            .filter(slot_allocations::company_name.eq(company))
            .filter(bookings::status.eq(BookingStatus::PENDING))
            .order(slots::start_at.asc())
            .select((
                bookings::booking_id,
                bookings::allocation_id,
                bookings::candidate_id,
                slots::start_at,
                slots::end_at,
                bookings::created_at,
            ))
            .load(conn)?;

    let views = rows
        .into_iter()
        .map(
            |(booking_id, allocation_id, candidate_id, start_at, end_at, created_at)| {
                models::PendingBookingView {
                    booking_id,
                    allocation_id,
                    candidate_id,
                    start_at,
                    end_at,
                    created_at,
                }
            },
        )
        .collect();

    Ok(views)
}

/// Flat rows for the CSV schedule export: every allocation of the event, one
/// line per booking (or a single line with empty candidate columns when the
/// allocation has none).
pub fn event_report_rows(conn: &mut PgConnection, event: i32) -> Result<Vec<ReportRow>, DbError> {
    use crate::schema::{bookings, slot_allocations, slots};

    let rows: Vec<(
        models::SlotAllocation,
        NaiveDateTime,
        NaiveDateTime,
        Option<String>,
        Option<BookingStatus>,
    )> = slot_allocations::table
        .inner_join(slots::table)
        .left_join(bookings::table)
        .filter(slots::event_id.eq(event))
        .order((slots::start_at.asc(), slot_allocations::allocation_id.asc()))
        .select((
            models::SlotAllocation::as_select(),
            slots::start_at,
            slots::end_at,
            bookings::candidate_id.nullable(),
            bookings::status.nullable(),
        ))
        .load(conn)?;

    let report = rows
        .into_iter()
        .map(|(allocation, start_at, end_at, candidate, status)| ReportRow {
            start_at,
            end_at,
            company_name: allocation.company_name,
            interviewer: allocation.interviewer,
            sector: allocation.sector,
            stand: allocation.stand,
            candidate_id: candidate,
            status,
        })
        .collect();

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_parsing_accepts_minutes_and_seconds() {
        assert_eq!(
            parse_time("09:30").unwrap(),
            NaiveTime::from_hms_opt(9, 30, 0).unwrap()
        );
        assert_eq!(
            parse_time("09:30:15").unwrap(),
            NaiveTime::from_hms_opt(9, 30, 15).unwrap()
        );
        assert!(parse_time("25:00").is_err());
        assert!(parse_time("not a time").is_err());
    }

    #[test]
    fn date_and_datetime_parsing() {
        assert!(parse_date("2025-03-14").is_ok());
        assert!(parse_date("14/03/2025").is_err());
        assert!(parse_datetime("2025-03-14 09:30").is_ok());
        assert!(parse_datetime("2025-03-14 09:30:00").is_ok());
        assert!(parse_datetime("2025-03-14").is_err());
    }

    #[test]
    fn workflow_errors_are_distinguishable_by_type() {
        let e: Box<dyn std::error::Error + Send + Sync> = WorkflowError::ScheduleConflict.into();
        assert_eq!(
            e.downcast_ref::<WorkflowError>(),
            Some(&WorkflowError::ScheduleConflict)
        );
        assert!(e.downcast_ref::<Forbidden>().is_none());
    }
}
