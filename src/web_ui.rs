//! Web UI for the onboarding flow
//!
//! Server-rendered pages. Each browser is tracked by a `sid` cookie that
//! selects its [`Client`] state in the registry.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::flow::{FlowStep, StepFlowController, StepInput, Transition};
use crate::results::{MissingResult, Navigation, ResultsView};
use crate::server::{AppState, Client};
use crate::session::NavigationType;
use crate::submission::{ImageFile, SubmissionError};
use crate::types::{Category, LocationCandidate};

// Load templates at compile time
const BASE_TEMPLATE: &str = include_str!("../templates/base.html");

pub const SESSION_COOKIE: &str = "sid";
pub const ENTRY_PATH: &str = "/introduction";
pub const TESTING_PATH: &str = "/testing";
pub const DEMOGRAPHICS_PATH: &str = "/demographics";
pub const NEXT_STAGE_PATH: &str = "/analysis/skin-conditions";

/// Largest photo accepted by the upload form
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

const PLACES_SCRIPT: &str = r#"<script>
function initPlaces() {
    const input = document.getElementById('location-input');
    const set = (addr, types, edited) => {
        document.getElementById('formatted_address').value = addr;
        document.getElementById('place_types').value = types;
        document.getElementById('edited').value = edited;
    };
    const box = new google.maps.places.SearchBox(input);
    box.addListener('places_changed', () => {
        const place = (box.getPlaces() || [])[0];
        if (place) {
            set(place.formatted_address || '', (place.types || []).join(','), '');
        } else {
            set('', '', '1');
        }
    });
    input.addEventListener('input', () => set('', '', '1'));
}
</script>
<script async src="https://maps.googleapis.com/maps/api/js?key={{KEY}}&libraries=places&callback=initPlaces"></script>"#;

/// Render page with base template
fn render_page(title: &str, content: &str) -> String {
    BASE_TEMPLATE
        .replace("{{TITLE}}", title)
        .replace("{{CONTENT}}", content)
}

/// Cookie value of the browser session, if it parses
fn session_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value).ok())
}

fn client(state: &AppState, headers: &HeaderMap) -> (Uuid, Arc<Client>) {
    state.clients.get_or_create(session_id(headers))
}

fn with_cookie(id: Uuid, response: impl IntoResponse) -> Response {
    let mut response = response.into_response();
    let cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, id);
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}

fn navigation_type(headers: &HeaderMap) -> NavigationType {
    NavigationType::from_cache_control(
        headers
            .get(header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok()),
    )
}

fn seed_flow(state: &AppState, client: &Client) -> StepFlowController {
    StepFlowController::seed(client.session.clone(), state.config.place_filter.clone())
}

pub fn nav_path(navigation: Navigation) -> &'static str {
    match navigation {
        Navigation::Entry => ENTRY_PATH,
        Navigation::Previous => TESTING_PATH,
        Navigation::Next => NEXT_STAGE_PATH,
    }
}

/// Landing page
pub async fn landing_page() -> Html<String> {
    let content = format!(
        r##"<div class="text-center space-y-8">
    <h1 class="text-6xl font-light tracking-tight">Sophisticated<br>skincare</h1>
    <a href="{}" class="inline-block border border-[#1a1b1c] px-8 py-3 text-sm font-semibold uppercase hover:bg-[#1a1b1c] hover:text-white transition">
        Take test
    </a>
</div>"##,
        ENTRY_PATH
    );
    Html(render_page("Home", &content))
}

fn render_introduction(flow: &StepFlowController, places_key: &str) -> String {
    let step = flow.current_step();
    let error_html = flow
        .validation_error()
        .map(|e| {
            format!(
                r#"<p class="text-red-600 text-sm mt-4" role="alert">{}</p>"#,
                html_escape(&e.to_string())
            )
        })
        .unwrap_or_default();

    let (label, form) = match step {
        FlowStep::NameEntry => {
            let label = if flow.name().is_empty() { "CLICK TO TYPE" } else { step.prompt() };
            let form = format!(
                r##"<form method="post" action="{}/name">
    <input id="introduction-form__input" name="name" type="text" value="{}" placeholder="Introduce yourself"
        aria-label="Enter your name" autocomplete="off"
        class="text-center text-5xl font-light bg-transparent border-b border-[#1a1b1c] outline-none w-full">
    <button type="submit" class="mt-8 text-sm font-semibold uppercase">Proceed</button>
</form>"##,
                ENTRY_PATH,
                html_escape(flow.name())
            );
            (label, form)
        }
        FlowStep::LocationEntry => {
            let location = flow.location().unwrap_or_default();
            let label = if location.is_empty() { "CLICK TO TYPE" } else { step.prompt() };
            let script = if places_key.is_empty() {
                String::new()
            } else {
                PLACES_SCRIPT.replace("{{KEY}}", &html_escape(places_key))
            };
            let form = format!(
                r##"<form method="post" action="{}/location">
    <input id="location-input" type="text" value="{}" placeholder="Where are you from?"
        aria-label="Enter your location" autocomplete="off"
        class="text-center text-5xl font-light bg-transparent border-b border-[#1a1b1c] outline-none w-full">
    <input type="hidden" id="formatted_address" name="formatted_address" value="">
    <input type="hidden" id="place_types" name="place_types" value="">
    <input type="hidden" id="edited" name="edited" value="">
    <button type="submit" class="mt-8 text-sm font-semibold uppercase">Proceed</button>
</form>
{}"##,
                ENTRY_PATH,
                html_escape(location),
                script
            );
            (label, form)
        }
    };

    let content = format!(
        r##"<div class="text-center">
    <h1 class="text-xs font-semibold uppercase mb-16">To start analysis</h1>
    <div class="text-sm text-gray-400 mb-4">{}</div>
    {}
    {}
</div>
<form method="post" action="{}/back" class="fixed bottom-8 left-8">
    <button type="submit" aria-label="Go back" class="text-sm font-semibold uppercase">Back</button>
</form>"##,
        label, form, error_html, ENTRY_PATH
    );

    render_page("Introduction", &content)
}

/// Flow entry point. A reload wipes the session and starts over.
pub async fn introduction_page(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let (id, client) = client(&state, &headers);
    client.cancel_upload();
    client.session.begin(navigation_type(&headers));

    let flow = seed_flow(&state, &client);
    let html = render_introduction(&flow, &state.config.places_api_key);
    *client.flow.lock().await = Some(flow);

    with_cookie(id, Html(html))
}

#[derive(Deserialize)]
pub struct NameForm {
    #[serde(default)]
    name: String,
}

pub async fn name_submit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<NameForm>,
) -> Response {
    let (id, client) = client(&state, &headers);
    let mut guard = client.flow.lock().await;
    let flow = guard.get_or_insert_with(|| seed_flow(&state, &client));

    if let Err(e) = flow.advance(StepInput::Name(form.name)) {
        // Recorded on the flow; the page re-renders with it
        debug!("Name rejected: {}", e);
    }
    with_cookie(id, Html(render_introduction(flow, &state.config.places_api_key)))
}

#[derive(Deserialize)]
pub struct LocationForm {
    #[serde(default)]
    formatted_address: String,
    #[serde(default)]
    place_types: String,
    #[serde(default)]
    edited: String,
}

/// Location step. Completing it sends the identity upstream; the flow lock is
/// held across that call so a second submit waits its turn.
pub async fn location_submit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<LocationForm>,
) -> Response {
    let (id, client) = client(&state, &headers);
    let mut guard = client.flow.lock().await;
    let flow = guard.get_or_insert_with(|| seed_flow(&state, &client));

    let candidate = if form.formatted_address.trim().is_empty() {
        if !form.edited.is_empty() {
            flow.edit_location();
        }
        None
    } else {
        Some(LocationCandidate::from_form(&form.formatted_address, &form.place_types))
    };

    let submitted = match flow.advance(StepInput::Location(candidate)) {
        Ok(Transition::Submit(profile)) => match state.gateway.submit_identity(&profile).await {
            Ok(ack) => {
                info!("Identity accepted upstream ({})", ack.status);
                true
            }
            Err(e) => {
                flow.fail_submission(&e);
                false
            }
        },
        _ => false,
    };

    if submitted {
        *guard = None;
        return with_cookie(id, Redirect::to(TESTING_PATH));
    }

    let html = guard
        .as_ref()
        .map(|flow| render_introduction(flow, &state.config.places_api_key))
        .unwrap_or_default();
    with_cookie(id, Html(html))
}

/// Step back; at the first step this leaves the flow
pub async fn back_submit(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let (id, client) = client(&state, &headers);
    let mut guard = client.flow.lock().await;
    let flow = guard.get_or_insert_with(|| seed_flow(&state, &client));

    if flow.retreat() {
        let html = render_introduction(flow, &state.config.places_api_key);
        return with_cookie(id, Html(html));
    }

    *guard = None;
    with_cookie(id, Redirect::to("/"))
}

fn render_testing(error: Option<&str>) -> String {
    let error_html = error
        .map(|e| {
            format!(
                r#"<p class="text-red-600 text-sm mt-6 text-center" role="alert">{}</p>"#,
                html_escape(e)
            )
        })
        .unwrap_or_default();

    let content = format!(
        r##"<h1 class="text-xs font-semibold uppercase mb-16 text-center">To start analysis</h1>
<form method="post" action="{}/upload" enctype="multipart/form-data"
    onsubmit="this.classList.add('is-loading'); this.querySelector('button').disabled = true;"
    class="flex flex-col items-center gap-6">
    <label class="text-sm font-semibold uppercase">Allow A.I. access to gallery</label>
    <input type="file" name="image" accept="image/*" required>
    <button type="submit" class="border border-[#1a1b1c] px-8 py-3 text-sm font-semibold uppercase">Analyze</button>
</form>
<div class="loading-overlay fixed inset-0 bg-white/90 items-center justify-center text-sm font-semibold uppercase">
    Preparing your analysis...
</div>
{}
<a href="{}" class="fixed bottom-8 left-8 text-sm font-semibold uppercase">Back</a>"##,
        TESTING_PATH, error_html, ENTRY_PATH
    );

    render_page("Testing", &content)
}

/// Photo selection page
pub async fn testing_page(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let (id, _client) = client(&state, &headers);
    with_cookie(id, Html(render_testing(None)))
}

/// Run the image submission sequence and move on to the results
pub async fn upload_submit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let (id, client) = client(&state, &headers);

    let mut file = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("image") {
            continue;
        }
        let mime = field.content_type().unwrap_or("image/jpeg").to_string();
        let name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await?;
        if bytes.is_empty() {
            continue;
        }

        let mut image = ImageFile::new(&mime, bytes.to_vec());
        if let Some(name) = name {
            image = image.with_name(&name);
        }
        file = Some(image);
    }
    let file = file.ok_or(AppError::MissingImage)?;

    let token = client.start_upload();
    let response = match state.submission.submit(&client.session, file, &token).await {
        Ok(_) => Redirect::to(DEMOGRAPHICS_PATH).into_response(),
        Err(e) => {
            let status = match e {
                SubmissionError::Gateway(_) => StatusCode::BAD_GATEWAY,
                SubmissionError::Cancelled => StatusCode::CONFLICT,
                SubmissionError::Encode(_) | SubmissionError::Persist(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            (status, Html(render_testing(Some(&e.to_string())))).into_response()
        }
    };
    Ok(with_cookie(id, response))
}

fn format_percent(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}%", value)
    } else {
        format!("{:.2}%", value)
    }
}

fn render_demographics(view: &ResultsView) -> String {
    let tabs: String = Category::ALL
        .iter()
        .map(|c| {
            let p = view.prediction(*c);
            let class = if *c == view.selected() {
                "bg-[#1a1b1c] text-white"
            } else {
                "bg-gray-100 hover:bg-gray-200"
            };
            format!(
                r#"<a role="tab" href="{}?tab={}" class="block p-4 border-t border-[#1a1b1c] {}"><div class="text-base font-semibold">{}</div><div class="text-xs uppercase">{}</div></a>"#,
                DEMOGRAPHICS_PATH,
                c,
                class,
                html_escape(&p.predicted),
                c
            )
        })
        .collect();

    let rows: String = view
        .rows()
        .iter()
        .map(|r| {
            let class = if r.is_predicted {
                "bg-[#1a1b1c] text-white"
            } else {
                "hover:bg-gray-100"
            };
            format!(
                r#"<li class="flex justify-between px-4 py-3 {}"><span>{}</span><span>{}</span></li>"#,
                class,
                html_escape(&r.label),
                format_percent(r.value)
            )
        })
        .collect();

    let selected = view.selected_prediction();
    let content = format!(
        r##"<div class="mb-8">
    <div class="text-xs font-semibold uppercase">A. I. Analysis</div>
    <h1 class="text-6xl font-light uppercase">Demographics</h1>
    <p class="text-sm">Predicted Race &amp; Age</p>
</div>
<div class="grid grid-cols-1 md:grid-cols-[1fr_3fr_2fr] gap-4">
    <div role="tablist" class="space-y-2">{}</div>
    <div class="bg-gray-100 border-t border-[#1a1b1c] p-6">
        <div class="text-3xl capitalize">{}</div>
        <div class="text-5xl mt-8">{}</div>
    </div>
    <div class="bg-gray-100 border-t border-[#1a1b1c]">
        <div class="flex justify-between px-4 py-3 text-xs uppercase"><span>{}</span><span>A.I. confidence</span></div>
        <ul>{}</ul>
    </div>
</div>
<div class="flex justify-between mt-8">
    <form method="post" action="{}/back"><button type="submit" class="text-sm font-semibold uppercase">Back</button></form>
    <div class="flex gap-4">
        <form method="post" action="{}/reset"><button type="submit" class="border px-4 py-2 text-sm uppercase">Reset</button></form>
        <form method="post" action="{}/confirm"><button type="submit" class="bg-[#1a1b1c] text-white px-4 py-2 text-sm uppercase">Confirm</button></form>
    </div>
</div>"##,
        tabs,
        html_escape(&selected.predicted),
        format_percent(selected.confidence),
        view.selected(),
        rows,
        DEMOGRAPHICS_PATH,
        DEMOGRAPHICS_PATH,
        DEMOGRAPHICS_PATH
    );

    render_page("Demographics", &content)
}

#[derive(Deserialize)]
pub struct TabQuery {
    #[serde(default)]
    tab: Option<String>,
}

/// Results page, or back to the start when nothing was analyzed
pub async fn demographics_page(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<TabQuery>,
) -> Response {
    let (id, client) = client(&state, &headers);
    let mut view = match ResultsView::load(&client.session) {
        Ok(view) => view,
        Err(MissingResult) => return with_cookie(id, Redirect::to(nav_path(Navigation::Entry))),
    };

    if let Some(tab) = query.tab.as_deref().and_then(|t| t.parse().ok()) {
        view.select_tab(tab);
    }
    with_cookie(id, Html(render_demographics(&view)))
}

/// Shared shape of the results page buttons
async fn demographics_action(
    state: &AppState,
    headers: &HeaderMap,
    action: fn(&mut ResultsView) -> String,
) -> Response {
    let (id, client) = client(state, headers);
    match ResultsView::load(&client.session) {
        Ok(mut view) => with_cookie(id, Redirect::to(&action(&mut view))),
        Err(MissingResult) => with_cookie(id, Redirect::to(nav_path(Navigation::Entry))),
    }
}

pub async fn demographics_reset(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    demographics_action(&state, &headers, |view| {
        view.reset();
        format!("{}?tab={}", DEMOGRAPHICS_PATH, view.selected())
    })
    .await
}

pub async fn demographics_confirm(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    demographics_action(&state, &headers, |view| nav_path(view.confirm()).to_string()).await
}

pub async fn demographics_back(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    demographics_action(&state, &headers, |view| nav_path(view.back()).to_string()).await
}

/// Placeholder for the stage after demographics
pub async fn next_stage_page() -> Html<String> {
    let content = format!(
        r##"<div class="text-center space-y-6">
    <h1 class="text-4xl font-light">Skin condition analysis</h1>
    <p class="text-sm text-gray-500">This stage is not available yet.</p>
    <a href="{}" class="text-sm font-semibold uppercase">Back to demographics</a>
</div>"##,
        DEMOGRAPHICS_PATH
    );
    Html(render_page("Analysis", &content))
}

pub fn create_web_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(landing_page))
        .route(ENTRY_PATH, get(introduction_page))
        .route("/introduction/name", post(name_submit))
        .route("/introduction/location", post(location_submit))
        .route("/introduction/back", post(back_submit))
        .route(TESTING_PATH, get(testing_page))
        .route(
            "/testing/upload",
            post(upload_submit).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route(DEMOGRAPHICS_PATH, get(demographics_page))
        .route("/demographics/reset", post(demographics_reset))
        .route("/demographics/confirm", post(demographics_confirm))
        .route("/demographics/back", post(demographics_back))
        .route(NEXT_STAGE_PATH, get(next_stage_page))
}

/// Escape HTML characters
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
