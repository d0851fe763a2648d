//! HTTP surface.
//!
//! JSON endpoints for resources and session edits, and server-sent event
//! streams for generation. Streaming endpoints emit `text` or `history`
//! events as the reply grows, then one `done` or `error` event.
//!
//! | Method | Path | |
//! |---|---|---|
//! | GET | `/health` | liveness and loaded model |
//! | GET, POST | `/models` | list, switch |
//! | GET | `/presets`, `/presets/:name` | list, read |
//! | GET, POST | `/characters`, `/characters/tavern` | list, upload |
//! | GET, POST | `/extensions`, `/extensions/:name` | list, configure |
//! | POST | `/generate` | default and notebook generation (SSE) |
//! | GET, POST | `/sessions` | list, create |
//! | GET, PATCH, DELETE | `/sessions/:id` | read, edit names/context, delete |
//! | POST | `/sessions/:id/{chat,impersonate,regenerate}` | chat turns (SSE) |
//! | POST | `/sessions/:id/{stop,remove-last,clear}` | turn control |
//! | GET, POST | `/sessions/:id/history` | read, upload |
//! | POST | `/sessions/:id/history/save` | export to `logs/` |
//! | GET, PUT | `/sessions/:id/reply` | last reply, replace it |
//! | PUT | `/sessions/:id/character` | select a character or `None` |

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post, put},
    Json, Router,
};
use base64::Engine as _;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use textgen_common::{ErrorCategory, TextgenError};
use tokio::sync::mpsc;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::character::{self, TavernCard, NO_CHARACTER};
use crate::chat::{ChatEngine, ChatOptions, Conversation};
use crate::extensions::{ExtensionInfo, ExtensionRegistry};
use crate::generation::{generate_reply, GeneratorConfig};
use crate::model::ModelManager;
use crate::preset::load_preset;
use crate::resources::ResourceDirs;
use crate::session::{Session, SessionInfo, SessionManager};
use crate::settings::{ChatProfile, Settings};
use crate::storage::{parse_history, save_history};
use crate::types::{
    DecodingConfig, EngineError, ExtensionError, FinishReason, GenerationError, GenerationRequest,
    InteractionMode, ModelError, ResourceError, SessionError, SessionId, Turn,
};

/// Default listening port.
pub const DEFAULT_PORT: u16 = 7860;

/// Events buffered between a generation worker and its HTTP stream.
const EVENT_BUFFER: usize = 16;

/// Shared handles for request handlers.
#[derive(Clone)]
pub struct AppState {
    pub models: Arc<ModelManager>,
    pub sessions: Arc<SessionManager>,
    pub extensions: ExtensionRegistry,
    pub settings: Arc<Settings>,
    pub dirs: ResourceDirs,
    pub generator: GeneratorConfig,
}

impl AppState {
    pub fn new(
        models: Arc<ModelManager>,
        settings: Settings,
        dirs: ResourceDirs,
        extensions: ExtensionRegistry,
        generator: GeneratorConfig,
    ) -> Self {
        Self {
            models,
            sessions: Arc::new(SessionManager::default()),
            extensions,
            settings: Arc::new(settings),
            dirs,
            generator,
        }
    }

    async fn profile(&self) -> ChatProfile {
        let model = self.models.current_name().await.unwrap_or_default();
        self.settings.profile_for_model(&model)
    }

    async fn session(&self, id: &str) -> Result<Arc<Session>, ApiError> {
        let id: SessionId = id
            .parse()
            .map_err(|_| SessionError::NotFound(id.to_string()))?;
        Ok(self.sessions.get_session(&id).await?)
    }

    /// Decoding parameters: explicit values, else the named preset, else the
    /// profile's preset (falling back to defaults if its file is missing).
    fn decoding(
        &self,
        params: &TurnParams,
        profile: &ChatProfile,
    ) -> Result<DecodingConfig, ResourceError> {
        if let Some(decoding) = &params.decoding {
            return Ok(decoding.clone());
        }
        if let Some(preset) = &params.preset {
            return load_preset(&self.dirs.presets(), preset);
        }
        match load_preset(&self.dirs.presets(), &profile.preset) {
            Ok(decoding) => Ok(decoding),
            Err(e) => {
                warn!("Using default decoding parameters: {}", e);
                Ok(DecodingConfig::default())
            }
        }
    }

    async fn chat_options(&self, params: &TurnParams) -> Result<ChatOptions, ApiError> {
        let profile = self.profile().await;
        Ok(ChatOptions {
            max_new_tokens: self
                .settings
                .clamp_max_new_tokens(params.max_new_tokens.unwrap_or(self.settings.max_new_tokens)),
            decoding: self.decoding(params, &profile)?,
            stop_at_newline: params.stop_at_newline.unwrap_or(profile.stop_at_newline),
            history_size: self
                .settings
                .clamp_history_size(params.history_size.unwrap_or(self.settings.history_size)),
        })
    }
}

/// Error response: `{"error": message, "code": code}` with a status from the
/// error's code and category.
#[derive(Debug)]
pub struct ApiError(EngineError);

macro_rules! api_error_from {
    ($($error:ty),*) => {
        $(impl From<$error> for ApiError {
            fn from(error: $error) -> Self {
                Self(EngineError::from(error))
            }
        })*
    };
}

api_error_from!(ModelError, GenerationError, SessionError, ResourceError, ExtensionError);

impl From<EngineError> for ApiError {
    fn from(error: EngineError) -> Self {
        Self(error)
    }
}

pub fn status_for(error: &EngineError) -> StatusCode {
    match error.error_code() {
        "SESSION_BUSY" => StatusCode::CONFLICT,
        "SESSION_NOT_FOUND" | "MODEL_NOT_FOUND" | "RESOURCE_NOT_FOUND" | "EXTENSION_UNKNOWN" => {
            StatusCode::NOT_FOUND
        }
        "MODEL_NOT_LOADED" => StatusCode::SERVICE_UNAVAILABLE,
        "SESSION_LIMIT" => StatusCode::TOO_MANY_REQUESTS,
        _ => match error.category() {
            ErrorCategory::User => StatusCode::BAD_REQUEST,
            ErrorCategory::External => StatusCode::BAD_GATEWAY,
            ErrorCategory::System | ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        debug!("Request failed with {}: {}", status, self.0);
        let body = Json(json!({
            "error": self.0.to_string(),
            "code": self.0.error_code(),
        }));
        (status, body).into_response()
    }
}

/// One server-sent event.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum StreamEvent {
    Text {
        text: String,
    },
    History {
        history: Vec<Turn>,
    },
    Done {
        finish_reason: Option<FinishReason>,
    },
    Error {
        code: &'static str,
        message: String,
    },
}

impl StreamEvent {
    fn name(&self) -> &'static str {
        match self {
            StreamEvent::Text { .. } => "text",
            StreamEvent::History { .. } => "history",
            StreamEvent::Done { .. } => "done",
            StreamEvent::Error { .. } => "error",
        }
    }

    fn into_sse(self) -> Event {
        let data = serde_json::to_string(&self).unwrap_or_else(|_| "{}".to_string());
        Event::default().event(self.name()).data(data)
    }
}

fn event_stream(
    rx: mpsc::Receiver<StreamEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = ReceiverStream::new(rx).map(|event| Ok::<_, Infallible>(event.into_sse()));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Run a generation on the blocking pool, then report how it ended.
fn spawn_generation<F>(tx: mpsc::Sender<StreamEvent>, work: F)
where
    F: FnOnce(&mpsc::Sender<StreamEvent>) -> Result<Option<FinishReason>, EngineError>
        + Send
        + 'static,
{
    tokio::task::spawn_blocking(move || {
        let last = match work(&tx) {
            Ok(finish_reason) => StreamEvent::Done { finish_reason },
            Err(e) => {
                warn!("Generation failed: {}", e);
                StreamEvent::Error {
                    code: e.error_code(),
                    message: e.to_string(),
                }
            }
        };
        if tx.blocking_send(last).is_err() {
            debug!("Stream closed before the final event");
        }
    });
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TurnParams {
    pub max_new_tokens: Option<usize>,
    pub preset: Option<String>,
    pub decoding: Option<DecodingConfig>,
    pub stop_at_newline: Option<bool>,
    pub history_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default)]
    pub mode: Option<InteractionMode>,
    #[serde(flatten)]
    pub params: TurnParams,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub text: String,
    #[serde(flatten)]
    pub params: TurnParams,
}

#[derive(Debug, Deserialize)]
pub struct SwitchModelRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadCharacterRequest {
    pub character: Value,
    /// Base64-encoded PNG saved next to the character file.
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UploadTavernRequest {
    pub card: TavernCard,
    #[serde(default)]
    pub image: Option<String>,
    /// Replaces `{{user}}` in the example dialogue; defaults to the profile's name.
    #[serde(default)]
    pub name1: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConfigureExtensionRequest {
    pub enabled: Option<bool>,
    pub params: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateSessionRequest {
    pub character: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EditSessionRequest {
    pub name1: Option<String>,
    pub name2: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UploadHistoryRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceReplyRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct SelectCharacterRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub id: SessionId,
    #[serde(flatten)]
    pub conversation: Conversation,
    pub history: Vec<Turn>,
}

impl SessionView {
    fn new(id: SessionId, conversation: &Conversation) -> Self {
        Self {
            id,
            conversation: conversation.clone(),
            history: conversation.history.displayed().to_vec(),
        }
    }
}

fn decode_image(image: Option<&str>) -> Result<Option<Vec<u8>>, ResourceError> {
    image
        .map(|data| {
            base64::engine::general_purpose::STANDARD
                .decode(data)
                .map_err(|e| ResourceError::Invalid(format!("image is not base64: {}", e)))
        })
        .transpose()
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "model": state.models.current_name().await,
    }))
}

async fn list_models(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "models": state.dirs.available_models(),
        "current": state.models.current_name().await,
    }))
}

async fn switch_model(
    State(state): State<AppState>,
    Json(req): Json<SwitchModelRequest>,
) -> Result<Json<Value>, ApiError> {
    let switched = state.models.switch_to(&req.name).await?;
    Ok(Json(json!({ "model": req.name, "switched": switched })))
}

async fn list_presets(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.dirs.available_presets())
}

async fn get_preset(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<DecodingConfig>, ApiError> {
    Ok(Json(load_preset(&state.dirs.presets(), &name)?))
}

async fn list_characters(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.dirs.available_characters())
}

async fn upload_character(
    State(state): State<AppState>,
    Json(req): Json<UploadCharacterRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let image = decode_image(req.image.as_deref())?;
    let json = req.character.to_string();
    let name = character::upload_character(&state.dirs.characters(), &json, image.as_deref(), false)?;
    Ok((StatusCode::CREATED, Json(json!({ "name": name }))))
}

async fn upload_tavern_character(
    State(state): State<AppState>,
    Json(req): Json<UploadTavernRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let image = decode_image(req.image.as_deref())?;
    let name1 = match req.name1 {
        Some(name1) => name1,
        None => state.profile().await.name1,
    };
    let name = character::upload_tavern_character(
        &state.dirs.characters(),
        req.card,
        image.as_deref(),
        &name1,
    )?;
    Ok((StatusCode::CREATED, Json(json!({ "name": name }))))
}

async fn list_extensions(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "available": state.dirs.available_extensions(),
        "loaded": state.extensions.describe(),
    }))
}

async fn configure_extension(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<ConfigureExtensionRequest>,
) -> Result<Json<ExtensionInfo>, ApiError> {
    if let Some(enabled) = req.enabled {
        state.extensions.set_enabled(&name, enabled)?;
    }
    state.extensions.update_params(&name, req.params)?;
    let info = state
        .extensions
        .describe()
        .into_iter()
        .find(|info| info.name == name)
        .ok_or_else(|| ExtensionError::Unknown(name.clone()))?;
    Ok(Json(info))
}

async fn generate(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let profile = state.profile().await;
    let max_new_tokens = state
        .settings
        .clamp_max_new_tokens(req.params.max_new_tokens.unwrap_or(state.settings.max_new_tokens));
    let request = GenerationRequest::new(req.prompt, max_new_tokens)
        .with_decoding(state.decoding(&req.params, &profile)?);
    let config = GeneratorConfig {
        mode: req.mode.unwrap_or(state.generator.mode),
        ..state.generator.clone()
    };
    let model = state.models.acquire().await?;
    let extensions = state.extensions.clone();

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    spawn_generation(tx, move |tx| {
        let mut stream = generate_reply(
            model.adapter.as_ref(),
            &extensions,
            &config,
            request,
            CancellationToken::new(),
        )?;
        for text in stream.by_ref() {
            if tx.blocking_send(StreamEvent::Text { text: text? }).is_err() {
                debug!("Client went away, stopping generation");
                return Ok(Some(FinishReason::Cancelled));
            }
        }
        Ok(stream.finish_reason().cloned())
    });
    Ok(event_stream(rx))
}

async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionInfo>> {
    Json(state.sessions.list_sessions().await)
}

async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionView>), ApiError> {
    let profile = state.profile().await;
    let mut conversation = Conversation::new(&profile);
    if let Some(name) = req.character.filter(|name| name != NO_CHARACTER) {
        let loaded = character::load_character(
            &state.dirs.characters(),
            &name,
            &conversation.name1,
            &state.extensions,
        )?;
        conversation.apply_character(loaded);
    }
    let session = state.sessions.create_session(conversation).await?;
    let guard = session.lock()?;
    Ok((
        StatusCode::CREATED,
        Json(SessionView::new(session.id(), &guard)),
    ))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let session = state.session(&id).await?;
    let guard = session.lock()?;
    Ok(Json(SessionView::new(session.id(), &guard)))
}

async fn edit_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<EditSessionRequest>,
) -> Result<Json<SessionView>, ApiError> {
    let session = state.session(&id).await?;
    let mut guard = session.lock()?;
    if let Some(name1) = req.name1 {
        guard.name1 = name1;
    }
    if let Some(name2) = req.name2 {
        guard.name2 = name2;
    }
    if let Some(context) = req.context {
        guard.context = context;
    }
    Ok(Json(SessionView::new(session.id(), &guard)))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let session = state.session(&id).await?;
    state.sessions.delete_session(&session.id()).await;
    Ok(StatusCode::NO_CONTENT)
}

/// Which chat turn a streaming session request runs.
#[derive(Debug, Clone, Copy)]
enum TurnKind {
    Chat,
    Regenerate,
}

async fn start_turn(
    state: AppState,
    id: String,
    kind: TurnKind,
    text: String,
    params: TurnParams,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let session = state.session(&id).await?;
    let options = state.chat_options(&params).await?;
    let (mut conversation, cancel) = session.begin_generation()?;
    let model = state.models.acquire().await?;
    let extensions = state.extensions.clone();
    let generator = state.generator.clone();

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    spawn_generation(tx, move |tx| {
        let engine = ChatEngine::new(model.adapter.as_ref(), &extensions, &generator);
        let mut on_update = |turns: &[Turn]| {
            tx.blocking_send(StreamEvent::History {
                history: turns.to_vec(),
            })
            .is_ok()
        };
        match kind {
            TurnKind::Chat => {
                engine.chat(&mut conversation, &text, &options, cancel, &mut on_update)?
            }
            TurnKind::Regenerate => {
                engine.regenerate(&mut conversation, &options, cancel, &mut on_update)?
            }
        }
        Ok(None)
    });
    Ok(event_stream(rx))
}

async fn chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    start_turn(state, id, TurnKind::Chat, req.text, req.params).await
}

async fn regenerate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(params): Json<TurnParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    start_turn(state, id, TurnKind::Regenerate, String::new(), params).await
}

async fn impersonate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(params): Json<TurnParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let session = state.session(&id).await?;
    let options = state.chat_options(&params).await?;
    let (conversation, cancel) = session.begin_generation()?;
    let model = state.models.acquire().await?;
    let extensions = state.extensions.clone();
    let generator = state.generator.clone();

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    spawn_generation(tx, move |tx| {
        let engine = ChatEngine::new(model.adapter.as_ref(), &extensions, &generator);
        engine.impersonate(&conversation, &options, cancel, &mut |text: &str| {
            tx.blocking_send(StreamEvent::Text {
                text: text.to_string(),
            })
            .is_ok()
        })?;
        Ok(None)
    });
    Ok(event_stream(rx))
}

async fn stop(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.session(&id).await?.stop();
    Ok(StatusCode::ACCEPTED)
}

async fn remove_last(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let session = state.session(&id).await?;
    let mut guard = session.lock()?;
    let text = guard.remove_last();
    Ok(Json(json!({
        "text": text,
        "history": guard.history.displayed(),
    })))
}

async fn clear(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let session = state.session(&id).await?;
    let mut guard = session.lock()?;
    guard.clear();
    Ok(Json(SessionView::new(session.id(), &guard)))
}

async fn get_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let session = state.session(&id).await?;
    let guard = session.lock()?;
    Ok(Json(json!({
        "internal": guard.history.internal(),
        "visible": guard.history.displayed(),
    })))
}

async fn upload_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UploadHistoryRequest>,
) -> Result<Json<SessionView>, ApiError> {
    let session = state.session(&id).await?;
    let mut guard = session.lock()?;
    let history = parse_history(&req.content, &guard.name1, &guard.name2);
    guard.replace_history(history);
    Ok(Json(SessionView::new(session.id(), &guard)))
}

async fn export_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let session = state.session(&id).await?;
    let guard = session.lock()?;
    let path = save_history(&state.dirs.logs(), &guard.history, guard.character.as_deref())?;
    Ok((StatusCode::CREATED, Json(json!({ "path": path }))))
}

async fn last_reply(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let session = state.session(&id).await?;
    let guard = session.lock()?;
    Ok(Json(json!({ "text": guard.last_reply() })))
}

async fn replace_reply(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ReplaceReplyRequest>,
) -> Result<Json<SessionView>, ApiError> {
    let session = state.session(&id).await?;
    let mut guard = session.lock()?;
    guard.replace_last_reply(&req.text, &state.extensions);
    Ok(Json(SessionView::new(session.id(), &guard)))
}

async fn select_character(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SelectCharacterRequest>,
) -> Result<Json<SessionView>, ApiError> {
    let session = state.session(&id).await?;
    let profile = state.profile().await;
    let mut guard = session.lock()?;
    if req.name == NO_CHARACTER {
        guard.reset_character(&profile);
    } else {
        let loaded = character::load_character(
            &state.dirs.characters(),
            &req.name,
            &guard.name1,
            &state.extensions,
        )?;
        guard.apply_character(loaded);
    }
    Ok(Json(SessionView::new(session.id(), &guard)))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/models", get(list_models).post(switch_model))
        .route("/presets", get(list_presets))
        .route("/presets/:name", get(get_preset))
        .route("/characters", get(list_characters).post(upload_character))
        .route("/characters/tavern", post(upload_tavern_character))
        .route("/extensions", get(list_extensions))
        .route("/extensions/:name", post(configure_extension))
        .route("/generate", post(generate))
        .route("/sessions", get(list_sessions).post(create_session))
        .route(
            "/sessions/:id",
            get(get_session).patch(edit_session).delete(delete_session),
        )
        .route("/sessions/:id/chat", post(chat))
        .route("/sessions/:id/impersonate", post(impersonate))
        .route("/sessions/:id/regenerate", post(regenerate))
        .route("/sessions/:id/stop", post(stop))
        .route("/sessions/:id/remove-last", post(remove_last))
        .route("/sessions/:id/clear", post(clear))
        .route("/sessions/:id/history", get(get_history).post(upload_history))
        .route("/sessions/:id/history/save", post(export_history))
        .route("/sessions/:id/reply", get(last_reply).put(replace_reply))
        .route("/sessions/:id/character", put(select_character))
        .with_state(state)
}

/// Serve the API on `addr` until the process is stopped.
pub async fn serve(state: AppState, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await
}
