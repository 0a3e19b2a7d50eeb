#[macro_use]
extern crate diesel;

use actix_web::{delete, error, get, middleware, patch, post, web, App, HttpRequest, HttpResponse, HttpServer, Responder};
use diesel::{prelude::*, r2d2};

mod actions;
mod auth;
mod config;
mod models;
mod notify;
mod report;
mod scheduling;
mod schema;

use auth::Role;
use models::ApiResponse;

type DbPool = r2d2::Pool<r2d2::ConnectionManager<PgConnection>>;
type DbError = Box<dyn std::error::Error + Send + Sync>;

/// Maps action-layer errors onto HTTP responses. Classification is by error
/// type, never by message text.
fn error_response(e: DbError) -> actix_web::Error {
    let detail = e.to_string();
    log::error!("request failed: {:?}", e);

    let response = if e.downcast_ref::<actions::WorkflowError>().is_some() {
        HttpResponse::Conflict().json(ApiResponse { message: detail.clone() })
    } else if e.downcast_ref::<auth::Forbidden>().is_some() {
        HttpResponse::Forbidden().json(ApiResponse { message: detail.clone() })
    } else if let Some(diesel_error) = e.downcast_ref::<diesel::result::Error>() {
        match diesel_error {
            diesel::result::Error::NotFound => {
                HttpResponse::NotFound().json(ApiResponse { message: "not found".to_string() })
            }
            diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            ) => HttpResponse::Conflict().json(ApiResponse { message: detail.clone() }),
            _ => HttpResponse::BadRequest().json(ApiResponse { message: detail.clone() }),
        }
    } else {
        HttpResponse::BadRequest().json(ApiResponse { message: detail.clone() })
    };

    error::InternalError::from_response(detail, response).into()
}

fn forbidden_response(f: auth::Forbidden) -> actix_web::Error {
    let detail = f.to_string();
    error::InternalError::from_response(
        detail.clone(),
        HttpResponse::Forbidden().json(ApiResponse { message: detail }),
    )
    .into()
}

fn identified_caller(
    req: &HttpRequest,
    cfg: &config::AppConfig,
) -> Result<(), actix_web::Error> {
    let caller = req
        .headers()
        .get("x-user-id")
        .and_then(|v| v.to_str().ok());
    auth::require_identified(caller, cfg.demo_mode).map_err(forbidden_response)
}

#[post("/events")]
async fn create_event(
    pool: web::Data<DbPool>,
    form: web::Json<models::CreateEventRequest>,
) -> actix_web::Result<impl Responder> {
    let form = form.into_inner();
    auth::require_role(&form.actor, Role::Admin).map_err(forbidden_response)?;

    let event = web::block(move || {
        let mut conn = pool.get()?;
        actions::create_event(&mut conn, &form)
    })
    .await?
    .map_err(error_response)?;

    Ok(HttpResponse::Created().json(event))
}

#[get("/events")]
async fn list_events(
    req: HttpRequest,
    cfg: web::Data<config::AppConfig>,
    pool: web::Data<DbPool>,
) -> actix_web::Result<impl Responder> {
    identified_caller(&req, &cfg)?;

    let events = web::block(move || {
        let mut conn = pool.get()?;
        actions::list_events(&mut conn)
    })
    .await?
    .map_err(error_response)?;

    Ok(HttpResponse::Ok().json(events))
}

#[get("/events/{event_id}")]
async fn get_event(
    req: HttpRequest,
    cfg: web::Data<config::AppConfig>,
    pool: web::Data<DbPool>,
    path: web::Path<i32>,
) -> actix_web::Result<impl Responder> {
    identified_caller(&req, &cfg)?;
    let event_id = path.into_inner();

    let event = web::block(move || {
        let mut conn = pool.get()?;
        actions::get_event(&mut conn, event_id)
    })
    .await?
    .map_err(error_response)?;

    Ok(HttpResponse::Ok().json(event))
}

#[delete("/events/{event_id}")]
async fn delete_event(
    pool: web::Data<DbPool>,
    path: web::Path<i32>,
    form: web::Json<models::ActorOnlyRequest>,
) -> actix_web::Result<impl Responder> {
    auth::require_role(&form.actor, Role::Admin).map_err(forbidden_response)?;
    let event_id = path.into_inner();

    web::block(move || {
        let mut conn = pool.get()?;
        actions::delete_event(&mut conn, event_id)
    })
    .await?
    .map_err(error_response)?;

    Ok(HttpResponse::Ok().json(ApiResponse {
        message: "event and all dependent rows deleted".to_string(),
    }))
}

#[post("/events/{event_id}/slots")]
async fn generate_slots(
    pool: web::Data<DbPool>,
    path: web::Path<i32>,
    form: web::Json<models::GenerateSlotsRequest>,
) -> actix_web::Result<impl Responder> {
    auth::require_role(&form.actor, Role::Admin).map_err(forbidden_response)?;
    let event_id = path.into_inner();
    let confirm_append = form.confirm_append;

    let slots = web::block(move || {
        let mut conn = pool.get()?;
        actions::generate_slots(&mut conn, event_id, confirm_append)
    })
    .await?
    .map_err(error_response)?;

    log::info!("generated {} slots for event {}", slots.len(), event_id);

    Ok(HttpResponse::Created().json(slots))
}

#[get("/events/{event_id}/slots")]
async fn list_slots(
    req: HttpRequest,
    cfg: web::Data<config::AppConfig>,
    pool: web::Data<DbPool>,
    path: web::Path<i32>,
) -> actix_web::Result<impl Responder> {
    identified_caller(&req, &cfg)?;
    let event_id = path.into_inner();

    let slots = web::block(move || {
        let mut conn = pool.get()?;
        actions::list_slots(&mut conn, event_id)
    })
    .await?
    .map_err(error_response)?;

    Ok(HttpResponse::Ok().json(slots))
}

#[patch("/slots/{slot_id}")]
async fn update_slot(
    pool: web::Data<DbPool>,
    path: web::Path<i32>,
    form: web::Json<models::UpdateSlotRequest>,
) -> actix_web::Result<impl Responder> {
    auth::require_role(&form.actor, Role::Admin).map_err(forbidden_response)?;
    let slot_id = path.into_inner();
    let form = form.into_inner();

    let slot = web::block(move || {
        let mut conn = pool.get()?;
        let start = actions::parse_datetime(&form.start)?;
        let end = actions::parse_datetime(&form.end)?;
        actions::update_slot(&mut conn, slot_id, start, end)
    })
    .await?
    .map_err(error_response)?;

    Ok(HttpResponse::Ok().json(slot))
}

#[delete("/slots/{slot_id}")]
async fn delete_slot(
    pool: web::Data<DbPool>,
    path: web::Path<i32>,
    form: web::Json<models::ActorOnlyRequest>,
) -> actix_web::Result<impl Responder> {
    auth::require_role(&form.actor, Role::Admin).map_err(forbidden_response)?;
    let slot_id = path.into_inner();

    web::block(move || {
        let mut conn = pool.get()?;
        actions::delete_slot(&mut conn, slot_id)
    })
    .await?
    .map_err(error_response)?;

    Ok(HttpResponse::Ok().json(ApiResponse {
        message: "slot deleted".to_string(),
    }))
}

#[delete("/events/{event_id}/slots")]
async fn delete_event_slots(
    pool: web::Data<DbPool>,
    path: web::Path<i32>,
    form: web::Json<models::ActorOnlyRequest>,
) -> actix_web::Result<impl Responder> {
    auth::require_role(&form.actor, Role::Admin).map_err(forbidden_response)?;
    let event_id = path.into_inner();

    let deleted = web::block(move || {
        let mut conn = pool.get()?;
        actions::delete_event_slots(&mut conn, event_id)
    })
    .await?
    .map_err(error_response)?;

    Ok(HttpResponse::Ok().json(ApiResponse {
        message: format!("{} slots deleted", deleted),
    }))
}

#[post("/allocations/claim")]
async fn claim_slot(
    pool: web::Data<DbPool>,
    form: web::Json<models::ClaimSlotRequest>,
) -> actix_web::Result<impl Responder> {
    let form = form.into_inner();
    auth::require_role(&form.actor, Role::Company).map_err(forbidden_response)?;
    let company = auth::acting_company(&form.actor, None)
        .map_err(forbidden_response)?
        .to_string();

    let allocation = web::block(move || {
        let mut conn = pool.get()?;
        actions::create_allocation(
            &mut conn,
            form.slot_id,
            &company,
            Some(&form.interviewer),
            form.sector.as_deref(),
            None,
            true,
        )
    })
    .await?
    .map_err(error_response)?;

    Ok(HttpResponse::Created().json(allocation))
}

#[post("/allocations/assign")]
async fn assign_slot(
    pool: web::Data<DbPool>,
    form: web::Json<models::AssignSlotRequest>,
) -> actix_web::Result<impl Responder> {
    let form = form.into_inner();
    auth::require_role(&form.actor, Role::Admin).map_err(forbidden_response)?;

    let allocation = web::block(move || {
        let mut conn = pool.get()?;
        actions::create_allocation(
            &mut conn,
            form.slot_id,
            &form.company_name,
            form.interviewer.as_deref(),
            form.sector.as_deref(),
            form.stand.as_deref(),
            false,
        )
    })
    .await?
    .map_err(error_response)?;

    Ok(HttpResponse::Created().json(allocation))
}

#[post("/events/{event_id}/allocations/claim-range")]
async fn claim_range(
    pool: web::Data<DbPool>,
    path: web::Path<i32>,
    form: web::Json<models::ClaimRangeRequest>,
) -> actix_web::Result<impl Responder> {
    let form = form.into_inner();
    auth::require_role(&form.actor, Role::Company).map_err(forbidden_response)?;
    let company = auth::acting_company(&form.actor, None)
        .map_err(forbidden_response)?
        .to_string();
    let event_id = path.into_inner();

    let allocations = web::block(move || {
        let mut conn = pool.get()?;
        let range_start = actions::parse_time(&form.range_start)?;
        let range_end = actions::parse_time(&form.range_end)?;
        if form.interviewer.trim().is_empty() {
            return Err("interviewer name is required".into());
        }
        actions::create_allocations_for_range(
            &mut conn,
            event_id,
            range_start,
            range_end,
            &company,
            Some(&form.interviewer),
            form.sector.as_deref(),
            None,
            // Slots this company already holds are skipped on the
            // self-service path.
            true,
        )
    })
    .await?
    .map_err(error_response)?;

    Ok(HttpResponse::Created().json(allocations))
}

#[post("/events/{event_id}/allocations/assign-range")]
async fn assign_range(
    pool: web::Data<DbPool>,
    path: web::Path<i32>,
    form: web::Json<models::AssignRangeRequest>,
) -> actix_web::Result<impl Responder> {
    let form = form.into_inner();
    auth::require_role(&form.actor, Role::Admin).map_err(forbidden_response)?;
    let event_id = path.into_inner();

    let allocations = web::block(move || {
        let mut conn = pool.get()?;
        let range_start = actions::parse_time(&form.range_start)?;
        let range_end = actions::parse_time(&form.range_end)?;
        actions::create_allocations_for_range(
            &mut conn,
            event_id,
            range_start,
            range_end,
            &form.company_name,
            form.interviewer.as_deref(),
            form.sector.as_deref(),
            form.stand.as_deref(),
            // Admin may assign any company to any slot, already-allocated
            // ones included.
            false,
        )
    })
    .await?
    .map_err(error_response)?;

    Ok(HttpResponse::Created().json(allocations))
}

#[patch("/allocations/{allocation_id}/stand")]
async fn update_stand(
    pool: web::Data<DbPool>,
    path: web::Path<i32>,
    form: web::Json<models::UpdateStandRequest>,
) -> actix_web::Result<impl Responder> {
    let form = form.into_inner();
    auth::require_role(&form.actor, Role::Admin).map_err(forbidden_response)?;
    let allocation_id = path.into_inner();

    let allocation = web::block(move || {
        let mut conn = pool.get()?;
        actions::update_stand(&mut conn, allocation_id, form.stand.as_deref())
    })
    .await?
    .map_err(error_response)?;

    Ok(HttpResponse::Ok().json(allocation))
}

#[get("/events/{event_id}/allocations")]
async fn list_allocations(
    req: HttpRequest,
    cfg: web::Data<config::AppConfig>,
    pool: web::Data<DbPool>,
    path: web::Path<i32>,
) -> actix_web::Result<impl Responder> {
    identified_caller(&req, &cfg)?;
    let event_id = path.into_inner();

    let allocations = web::block(move || {
        let mut conn = pool.get()?;
        actions::list_event_allocations(&mut conn, event_id)
    })
    .await?
    .map_err(error_response)?;

    Ok(HttpResponse::Ok().json(allocations))
}

#[post("/bookings")]
async fn create_booking(
    pool: web::Data<DbPool>,
    notifier: web::Data<notify::NotificationService>,
    form: web::Json<models::CreateBookingRequest>,
) -> actix_web::Result<impl Responder> {
    let form = form.into_inner();
    auth::require_role(&form.actor, Role::Candidate).map_err(forbidden_response)?;

    let actor = form.actor.clone();
    let allocation_id = form.allocation_id;
    let candidate = actor.user_id.clone();

    let (booking, allocation, slot) = web::block(move || {
        let mut conn = pool.get()?;
        actions::create_booking(&mut conn, allocation_id, &candidate)
    })
    .await?
    .map_err(error_response)?;

    // Best-effort company notification, off the request path. A missing
    // company email just means nothing goes out.
    if let Some(company_email) = form.company_email {
        let notifier = notifier.clone();
        let company_name = allocation.company_name.clone();
        let candidate_name = form.candidate_name.clone();
        let cv_url = form.cv_url.clone();
        let (date, time) = (slot.start_at.date(), slot.start_at.time());

        tokio::spawn(async move {
            if let Err(e) = notifier
                .publish_booking_request(
                    &actor,
                    &company_email,
                    &company_name,
                    candidate_name.as_deref(),
                    date,
                    time,
                    cv_url.as_deref(),
                )
                .await
            {
                log::error!(
                    "Failed to notify '{}' of booking {}: {:?}",
                    company_name,
                    booking.booking_id,
                    e
                );
            }
        });
    }

    Ok(HttpResponse::Created().json(models::BookingResponse {
        booking_id: booking.booking_id,
        status: booking.status,
        message: "interview requested".to_string(),
    }))
}

#[post("/bookings/review")]
async fn review_booking(
    pool: web::Data<DbPool>,
    notifier: web::Data<notify::NotificationService>,
    form: web::Json<models::ReviewBookingRequest>,
) -> actix_web::Result<impl Responder> {
    let form = form.into_inner();
    auth::require_role(&form.actor, Role::Company).map_err(forbidden_response)?;

    // Companies may only touch their own allocations; admins bypass the
    // ownership check entirely.
    let acting_company = match form.actor.role {
        Role::Admin => None,
        _ => Some(
            auth::acting_company(&form.actor, None)
                .map_err(forbidden_response)?
                .to_string(),
        ),
    };

    let actor = form.actor.clone();
    let booking_id = form.booking_id;
    let new_status = form.status;

    let (booking, allocation, slot) = web::block(move || {
        let mut conn = pool.get()?;
        actions::review_booking(&mut conn, booking_id, acting_company.as_deref(), new_status)
    })
    .await?
    .map_err(error_response)?;

    if booking.status == models::BookingStatus::CONFIRMED {
        if let Some(candidate_email) = form.candidate_email {
            let notifier = notifier.clone();
            let company_name = allocation.company_name.clone();
            let (date, time) = (slot.start_at.date(), slot.start_at.time());

            tokio::spawn(async move {
                if let Err(e) = notifier
                    .publish_booking_approval(&actor, &candidate_email, &company_name, date, time)
                    .await
                {
                    log::error!(
                        "Failed to notify candidate of approval for booking {}: {:?}",
                        booking_id,
                        e
                    );
                }
            });
        }
    }

    Ok(HttpResponse::Ok().json(models::BookingResponse {
        booking_id: booking.booking_id,
        status: booking.status,
        message: "booking reviewed".to_string(),
    }))
}

#[post("/bookings/cancel")]
async fn cancel_booking(
    pool: web::Data<DbPool>,
    form: web::Json<models::CancelBookingRequest>,
) -> actix_web::Result<impl Responder> {
    let form = form.into_inner();
    auth::require_role(&form.actor, Role::Candidate).map_err(forbidden_response)?;

    web::block(move || {
        let mut conn = pool.get()?;
        actions::cancel_booking(&mut conn, form.booking_id, &form.actor.user_id)
    })
    .await?
    .map_err(error_response)?;

    Ok(HttpResponse::Ok().json(ApiResponse {
        message: "booking cancelled".to_string(),
    }))
}

#[get("/candidates/{candidate_id}/bookings")]
async fn candidate_bookings(
    req: HttpRequest,
    cfg: web::Data<config::AppConfig>,
    pool: web::Data<DbPool>,
    path: web::Path<String>,
) -> actix_web::Result<impl Responder> {
    identified_caller(&req, &cfg)?;
    let candidate_id = path.into_inner();

    let bookings = web::block(move || {
        let mut conn = pool.get()?;
        actions::list_candidate_bookings(&mut conn, &candidate_id)
    })
    .await?
    .map_err(error_response)?;

    Ok(HttpResponse::Ok().json(bookings))
}

#[get("/events/{event_id}/companies/{company}/pending")]
async fn pending_bookings(
    req: HttpRequest,
    cfg: web::Data<config::AppConfig>,
    pool: web::Data<DbPool>,
    path: web::Path<(i32, String)>,
) -> actix_web::Result<impl Responder> {
    identified_caller(&req, &cfg)?;
    let (event_id, company) = path.into_inner();

    let pending = web::block(move || {
        let mut conn = pool.get()?;
        actions::list_pending_for_company(&mut conn, event_id, &company)
    })
    .await?
    .map_err(error_response)?;

    Ok(HttpResponse::Ok().json(pending))
}

#[get("/events/{event_id}/report.csv")]
async fn event_report(
    req: HttpRequest,
    cfg: web::Data<config::AppConfig>,
    pool: web::Data<DbPool>,
    path: web::Path<i32>,
) -> actix_web::Result<impl Responder> {
    identified_caller(&req, &cfg)?;
    let event_id = path.into_inner();

    let rows = web::block(move || {
        let mut conn = pool.get()?;
        actions::event_report_rows(&mut conn, event_id)
    })
    .await?
    .map_err(error_response)?;

    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .body(report::render_csv(&rows)))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let app_config = config::AppConfig::from_env();

    // DB pool lives outside `HttpServer::new` so all workers share it.
    let pool = initialize_db_pool(&app_config.database_url);

    let mut notifier = notify::NotificationService::new(&app_config);
    if let Err(e) = notifier.initialize().await {
        // Notifications are best-effort; the booking workflow keeps working
        // without them.
        log::error!("Notification queue unavailable, continuing without it: {:?}", e);
    }
    let notifier = web::Data::new(notifier);

    let bind_addr = app_config.bind_addr.clone();
    let app_config = web::Data::new(app_config);

    log::info!("starting HTTP server at http://{}", bind_addr);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(pool.clone()))
            .app_data(notifier.clone())
            .app_data(app_config.clone())
            .wrap(middleware::Logger::default())
            .app_data(web::JsonConfig::default().error_handler(|err, _req| {
                let detail = err.to_string();
                let response = match err {
                    error::JsonPayloadError::ContentType => {
                        HttpResponse::UnsupportedMediaType().body("Unsupported Media Type")
                    }
                    error::JsonPayloadError::Deserialize(ref err) => {
                        HttpResponse::BadRequest().json(ApiResponse { message: err.to_string() })
                    }
                    _ => HttpResponse::BadRequest().json(ApiResponse { message: detail }),
                };
                error::InternalError::from_response(err, response).into()
            }))
            .service(create_event)
            .service(list_events)
            .service(get_event)
            .service(delete_event)
            .service(generate_slots)
            .service(list_slots)
            .service(update_slot)
            .service(delete_slot)
            .service(delete_event_slots)
            .service(claim_slot)
            .service(assign_slot)
            .service(claim_range)
            .service(assign_range)
            .service(update_stand)
            .service(list_allocations)
            .service(create_booking)
            .service(review_booking)
            .service(cancel_booking)
            .service(candidate_bookings)
            .service(pending_bookings)
            .service(event_report)
    })
    .bind(bind_addr)?
    .run()
    .await
}

fn initialize_db_pool(database_url: &str) -> DbPool {
    let manager = r2d2::ConnectionManager::<PgConnection>::new(database_url);
    r2d2::Pool::builder()
        .build(manager)
        .expect("database URL should be a valid Postgres connection string")
}
