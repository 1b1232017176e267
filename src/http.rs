//! HTTP API over a [`SpaceCore`]
//!
//! ## Land and content
//! - `GET /api/location?lat&lon` - Location record (created on first sight)
//! - `GET /api/content?lat&lon[&explore=true]` - Content at the spot, or within the
//!   default radius when exploring, plus the location record
//! - `POST /api/content` - `{lat, lon, action, userId, featureId?, media?}` where
//!   `action` is `post`, `buy` or `buy_feature`
//! - `GET /api/explore?lat&lon[&radius]` - Nearby content with distances, newest first
//! - `GET /api/nearby?lat&lon&kind[&radius]` - Nearby content, presence or events,
//!   closest first
//! - `GET /api/land/purchase` - Owned plots with their settings
//! - `POST /api/land/purchase` - `{lat, lon, userId, name?, rules?, allowPublicPosts?,
//!   requireApproval?}`
//! - `PUT /api/land/{key}/settings` - Owner-only settings change, same optional fields
//! - `GET /api/land/{key}/defense-status`
//! - `GET /api/features` - Feature catalog
//!
//! ## People and events
//! - `GET /api/presence?lat&lon` / `POST /api/presence` (`join` or `leave`)
//! - `GET /api/events` / `GET /api/events/{id}` / `GET /api/events/nearby?lat&lon[&radius]`
//!   / `POST /api/events/create`
//! - `POST /api/profile/create` / `GET /api/profile/{username}` / `GET /api/profiles`
//!   / `POST /api/login`
//!
//! Location keys are built from the `lat` and `lon` text exactly as the client sent
//! it, so `40.0` and `40` name different plots. In paths the key is percent-encoded.
//!
//! ## Example Usage
//!
//! ```bash
//! curl 'http://localhost:8095/api/location?lat=40.0&lon=-73.0'
//! curl -X POST -H 'Content-Type: application/json' \
//!      -d '{"lat":"40.0","lon":"-73.0","action":"buy","userId":"u1"}' \
//!      http://localhost:8095/api/content
//! ```

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::bounty::BountyDraft;
use crate::content::MediaRef;
use crate::error::{Result, SpaceError};
use crate::features;
use crate::keys::LocationKey;
use crate::location::LandSettingsUpdate;
use crate::profiles::ProfileDraft;
use crate::response::{self, HandlerResult};
use crate::space::{EntityKind, SpaceCore};

/// `lat`/`lon` kept as text for key construction
#[derive(Debug, Deserialize)]
struct SpotQuery {
    lat: String,
    lon: String,
    #[serde(default)]
    explore: bool,
}

#[derive(Debug, Deserialize)]
struct RadiusQuery {
    lat: f64,
    lon: f64,
    radius: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct EntityQuery {
    lat: f64,
    lon: f64,
    radius: Option<f64>,
    kind: EntityKind,
}

/// A JSON coordinate component, given either as a string or a number
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CoordText {
    Text(String),
    Number(serde_json::Number),
}

impl CoordText {
    fn into_text(self) -> String {
        match self {
            CoordText::Text(text) => text,
            CoordText::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ContentAction {
    Post,
    Buy,
    BuyFeature,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentRequest {
    lat: CoordText,
    lon: CoordText,
    action: ContentAction,
    #[serde(default)]
    user_id: String,
    feature_id: Option<String>,
    media: Option<MediaRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LandPurchaseRequest {
    lat: CoordText,
    lon: CoordText,
    #[serde(default, alias = "ownerId")]
    user_id: String,
    #[serde(flatten)]
    settings: LandSettingsUpdate,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LandSettingsRequest {
    #[serde(default)]
    user_id: String,
    #[serde(flatten)]
    settings: LandSettingsUpdate,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum PresenceAction {
    Join,
    Leave,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PresenceRequest {
    lat: Option<f64>,
    lon: Option<f64>,
    user_id: String,
    username: Option<String>,
    action: PresenceAction,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

fn parse_query<T: DeserializeOwned>(query: Option<&str>) -> Result<T> {
    serde_urlencoded::from_str(query.unwrap_or(""))
        .map_err(|e| SpaceError::InvalidInput(format!("query: {e}")))
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(body)?)
}

/// Percent-decode one path segment
fn decode_segment(segment: &str) -> Result<String> {
    urlencoding::decode(segment)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| SpaceError::InvalidInput(format!("path segment: {e}")))
}

/// The `{key}` of `/api/land/{key}/{action}`
fn land_key(path: &str, action: &str) -> Result<LocationKey> {
    let segment = path
        .strip_prefix("/api/land/")
        .and_then(|rest| rest.strip_suffix(action))
        .and_then(|rest| rest.strip_suffix('/'))
        .unwrap_or("");
    LocationKey::parse(&decode_segment(segment)?)
}

/// HTTP server state
pub struct HttpServer {
    core: Arc<SpaceCore>,
    bind_addr: SocketAddr,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(core: Arc<SpaceCore>, bind_addr: SocketAddr) -> Self {
        Self { core, bind_addr }
    }

    /// Run the HTTP server
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "HTTP server listening");

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { server.handle_request(req).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    warn!(addr = %remote_addr, error = %err, "Connection error");
                }
            });
        }
    }

    async fn handle_request(
        &self,
        req: Request<Incoming>,
    ) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let query = req.uri().query().map(str::to_string);
        let body = req.into_body().collect().await?.to_bytes();

        Ok(self.dispatch(&method, &path, query.as_deref(), &body).await)
    }

    /// Route one request. Never fails: errors become JSON error responses.
    pub async fn dispatch(
        &self,
        method: &Method,
        path: &str,
        query: Option<&str>,
        body: &[u8],
    ) -> Response<Full<Bytes>> {
        debug!(method = %method, path = %path, "Incoming request");

        let result = match (method, path) {
            (&Method::GET, "/health") => self.handle_health(),

            (&Method::GET, "/api/location") => self.handle_get_location(query),
            (&Method::GET, "/api/content") => self.handle_get_content(query),
            (&Method::POST, "/api/content") => self.handle_post_content(body),
            (&Method::GET, "/api/explore") => self.handle_explore(query),
            (&Method::GET, "/api/nearby") => self.handle_nearby(query),
            (&Method::GET, "/api/features") => Ok(response::ok(&serde_json::json!({
                "features": features::catalog(),
            }))),
            (&Method::GET, "/api/land/purchase") => {
                self.core.owned_locations().map(|lands| {
                    response::ok(&serde_json::json!({ "lands": lands }))
                })
            }
            (&Method::POST, "/api/land/purchase") => self.handle_land_purchase(body),

            (&Method::GET, "/api/presence") => self.handle_get_presence(query),
            (&Method::POST, "/api/presence") => self.handle_post_presence(body),

            (&Method::GET, "/api/events") => self.handle_list_events(),
            (&Method::GET, "/api/events/nearby") => self.handle_nearby_events(query),
            (&Method::POST, "/api/events/create") => self.handle_create_event(body),

            (&Method::POST, "/api/profile/create") => self.handle_create_profile(body),
            (&Method::GET, "/api/profiles") => {
                self.core.list_profiles().map(|profiles| {
                    response::ok(&serde_json::json!({ "profiles": profiles }))
                })
            }
            (&Method::POST, "/api/login") => self.handle_login(body),

            (
                _,
                "/health" | "/api/location" | "/api/content" | "/api/explore" | "/api/nearby"
                | "/api/features" | "/api/land/purchase" | "/api/presence" | "/api/events"
                | "/api/events/nearby" | "/api/events/create" | "/api/profile/create"
                | "/api/profiles" | "/api/login",
            ) => Ok(response::method_not_allowed()),

            (&Method::GET, p) if p.starts_with("/api/land/") && p.ends_with("/defense-status") => {
                self.handle_defense_status(p)
            }
            (&Method::PUT, p) if p.starts_with("/api/land/") && p.ends_with("/settings") => {
                self.handle_land_settings(p, body)
            }
            (&Method::GET, p) if p.starts_with("/api/events/") => {
                self.handle_get_event(&p["/api/events/".len()..])
            }
            (&Method::GET, p) if p.starts_with("/api/profile/") => {
                self.handle_get_profile(&p["/api/profile/".len()..])
            }

            _ => Ok(response::not_found("Not found")),
        };

        match result {
            Ok(response) => response,
            Err(e) => {
                if response::status_for(&e).is_server_error() {
                    error!(method = %method, path = %path, error = %e, "Request error");
                } else {
                    debug!(method = %method, path = %path, error = %e, "Request rejected");
                }
                response::error_response(e)
            }
        }
    }

    /// Health check endpoint
    fn handle_health(&self) -> HandlerResult {
        let stats = self.core.stats()?;
        Ok(response::ok(&serde_json::json!({
            "status": "ok",
            "stats": stats,
        })))
    }

    /// GET /api/location
    fn handle_get_location(&self, query: Option<&str>) -> HandlerResult {
        let q: SpotQuery = parse_query(query)?;
        let key = LocationKey::from_parts(&q.lat, &q.lon)?;
        let location = self.core.query_location_at_key(&key)?;
        Ok(response::ok(&location))
    }

    /// GET /api/content
    fn handle_get_content(&self, query: Option<&str>) -> HandlerResult {
        let q: SpotQuery = parse_query(query)?;
        let key = LocationKey::from_parts(&q.lat, &q.lon)?;
        let location = self.core.query_location_at_key(&key)?;
        let content = if q.explore {
            let center = key.coordinate();
            self.core
                .query_nearby_content(center.latitude, center.longitude, None)?
        } else {
            self.core.content_at_key(&key)?
        };
        Ok(response::ok(&serde_json::json!({
            "content": content,
            "location": location,
        })))
    }

    /// POST /api/content
    fn handle_post_content(&self, body: &[u8]) -> HandlerResult {
        let req: ContentRequest = parse_body(body)?;
        let key = LocationKey::from_parts(&req.lat.into_text(), &req.lon.into_text())?;

        match req.action {
            ContentAction::Post => {
                let media = req
                    .media
                    .ok_or_else(|| SpaceError::InvalidInput("media is required".into()))?;
                let item = self.core.post_content_at_key(&key, &req.user_id, media)?;
                Ok(response::created(&serde_json::json!({
                    "success": true,
                    "content": item,
                })))
            }
            ContentAction::Buy => {
                let location = self.core.purchase_location_at_key(&key, &req.user_id)?;
                Ok(response::ok(&serde_json::json!({
                    "success": true,
                    "location": location,
                })))
            }
            ContentAction::BuyFeature => {
                let feature_id = req
                    .feature_id
                    .ok_or_else(|| SpaceError::InvalidInput("featureId is required".into()))?;
                let location = self.core.purchase_feature_at_key(&key, &feature_id)?;
                Ok(response::ok(&serde_json::json!({
                    "success": true,
                    "location": location,
                })))
            }
        }
    }

    /// GET /api/explore
    fn handle_explore(&self, query: Option<&str>) -> HandlerResult {
        let q: RadiusQuery = parse_query(query)?;
        let content = self.core.explore(q.lat, q.lon, q.radius)?;
        Ok(response::ok(&serde_json::json!({ "content": content })))
    }

    /// GET /api/nearby
    fn handle_nearby(&self, query: Option<&str>) -> HandlerResult {
        let q: EntityQuery = parse_query(query)?;
        let radius = q.radius.unwrap_or(self.core.config().default_radius_m);
        let entities = self.core.query_nearby_entities(q.lat, q.lon, radius, q.kind)?;
        Ok(response::ok(&serde_json::json!({
            "entities": entities,
            "radius": radius,
        })))
    }

    /// GET /api/land/{key}/defense-status
    fn handle_defense_status(&self, path: &str) -> HandlerResult {
        let key = land_key(path, "defense-status")?;
        let status = self.core.defense_status(&key)?;
        Ok(response::ok(&serde_json::json!({ "status": status })))
    }

    /// POST /api/land/purchase
    fn handle_land_purchase(&self, body: &[u8]) -> HandlerResult {
        let req: LandPurchaseRequest = parse_body(body)?;
        let key = LocationKey::from_parts(&req.lat.into_text(), &req.lon.into_text())?;
        let land = self.core.purchase_land_at_key(&key, &req.user_id, req.settings)?;
        Ok(response::ok(&serde_json::json!({
            "success": true,
            "land": land,
        })))
    }

    /// PUT /api/land/{key}/settings
    fn handle_land_settings(&self, path: &str, body: &[u8]) -> HandlerResult {
        let key = land_key(path, "settings")?;
        let req: LandSettingsRequest = parse_body(body)?;
        let land = self
            .core
            .update_land_settings_at_key(&key, &req.user_id, req.settings)?;
        Ok(response::ok(&serde_json::json!({
            "success": true,
            "land": land,
        })))
    }

    /// GET /api/presence
    fn handle_get_presence(&self, query: Option<&str>) -> HandlerResult {
        let q: RadiusQuery = parse_query(query)?;
        let users = self.core.nearby_users(q.lat, q.lon, q.radius)?;
        Ok(response::ok(&serde_json::json!({ "users": users })))
    }

    /// POST /api/presence
    fn handle_post_presence(&self, body: &[u8]) -> HandlerResult {
        let req: PresenceRequest = parse_body(body)?;
        match req.action {
            PresenceAction::Join => {
                let (Some(lat), Some(lon)) = (req.lat, req.lon) else {
                    return Err(SpaceError::InvalidInput("lat and lon are required".into()));
                };
                self.core
                    .join_presence(lat, lon, &req.user_id, req.username.as_deref())?;
            }
            PresenceAction::Leave => {
                self.core.leave_presence(&req.user_id)?;
            }
        }
        Ok(response::ok(&serde_json::json!({ "success": true })))
    }

    /// GET /api/events
    fn handle_list_events(&self) -> HandlerResult {
        let events = self.core.list_bounties()?;
        Ok(response::ok(&serde_json::json!({ "events": events })))
    }

    /// GET /api/events/{id}
    fn handle_get_event(&self, segment: &str) -> HandlerResult {
        let id: u64 = segment
            .parse()
            .map_err(|_| SpaceError::InvalidInput(format!("invalid event id: {segment}")))?;
        let event = self.core.get_bounty(id)?;
        Ok(response::ok(&serde_json::json!({ "event": event })))
    }

    /// GET /api/events/nearby
    fn handle_nearby_events(&self, query: Option<&str>) -> HandlerResult {
        let q: RadiusQuery = parse_query(query)?;
        let radius = q.radius.unwrap_or(self.core.config().default_radius_m);
        let events = self.core.nearby_bounties(q.lat, q.lon, Some(radius))?;
        Ok(response::ok(&serde_json::json!({
            "events": events,
            "center": { "latitude": q.lat, "longitude": q.lon },
            "radius": radius,
        })))
    }

    /// POST /api/events/create
    fn handle_create_event(&self, body: &[u8]) -> HandlerResult {
        let draft: BountyDraft = parse_body(body)?;
        let event = self.core.create_bounty(draft)?;
        Ok(response::created(&serde_json::json!({
            "success": true,
            "event": event,
        })))
    }

    /// POST /api/profile/create
    fn handle_create_profile(&self, body: &[u8]) -> HandlerResult {
        let draft: ProfileDraft = parse_body(body)?;
        let profile = self.core.create_profile(draft)?;
        Ok(response::created(&serde_json::json!({
            "success": true,
            "profile": profile,
        })))
    }

    /// GET /api/profile/{username}
    fn handle_get_profile(&self, segment: &str) -> HandlerResult {
        let username = decode_segment(segment)?;
        let profile = self.core.get_profile(&username)?;
        Ok(response::ok(&serde_json::json!({ "profile": profile })))
    }

    /// POST /api/login
    fn handle_login(&self, body: &[u8]) -> HandlerResult {
        let req: LoginRequest = parse_body(body)?;
        let user = self.core.login(&req.username, &req.password)?;
        Ok(response::ok(&user))
    }
}
