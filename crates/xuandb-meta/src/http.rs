//! HTTP surface of the meta service.
//!
//! The admin endpoints are registered on every node's HTTP API, but only
//! voters expose the mutating ones; writes against a non-voter must go
//! through a voter, which forwards them to the leader. The Raft RPC
//! routes are mounted on the separate Raft listener.
//!
//! Mutating endpoints require admin credentials via HTTP basic auth,
//! except while the catalog has no users (so the first administrator can
//! be created) and except node joins, which are authorized by the
//! cluster-name match alone. Requests from peers carry the cluster
//! header instead of credentials; authorization already happened on the
//! node that accepted the client call.

use actix_web::http::StatusCode;
use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse};
use base64::prelude::*;
use chrono::{TimeDelta, Utc};
use openraft::raft::{AppendEntriesRequest, InstallSnapshotRequest, VoteRequest};
use serde::Deserialize;
use xuandb_commons::{Database, NodeInfo, Privilege, RequiredPrivileges, User};

use crate::client::{CLUSTER_HEADER, LEADER_HINT_HEADER};
use crate::error::{MetaError, Result};
use crate::service::{JoinRequest, MetaService};
use crate::storage::MetaTypeConfig;

/// Register the admin endpoints on the node HTTP API.
pub fn configure_api(cfg: &mut web::ServiceConfig, voter: bool) {
    cfg.service(list_nodes);

    if !voter {
        return;
    }
    cfg.service(create_user)
        .service(set_password)
        .service(drop_user)
        .service(create_database)
        .service(drop_database)
        .service(add_node)
        .service(drop_node)
        .service(node_heartbeat);
}

/// Register the Raft RPC endpoints on the Raft listener.
pub fn configure_raft(cfg: &mut web::ServiceConfig) {
    cfg.service(raft_vote)
        .service(raft_append)
        .service(raft_snapshot);
}

#[derive(Debug, Deserialize)]
struct NameQuery {
    name: String,
}

#[derive(Debug, Deserialize)]
struct IdQuery {
    id: u64,
}

/// Translate an error into its HTTP response. Responses from a non-leader
/// carry the leader's address as a hint when it is known.
fn error_response(svc: &MetaService, err: &MetaError) -> HttpResponse {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut builder = HttpResponse::build(status);
    if status.as_u16() >= 500 && !svc.is_leader() {
        if let Some(addr) = svc.leader_http_addr() {
            builder.insert_header((LEADER_HINT_HEADER, addr));
        }
    }
    builder.content_type("text/plain; charset=utf-8").body(err.to_string())
}

fn bad_request(msg: &str) -> HttpResponse {
    HttpResponse::BadRequest()
        .content_type("text/plain; charset=utf-8")
        .body(msg.to_string())
}

fn done(svc: &MetaService, result: Result<()>) -> HttpResponse {
    match result {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(e) => error_response(svc, &e),
    }
}

/// Basic-auth credentials of a request; empty strings when absent.
fn basic_credentials(req: &HttpRequest) -> (String, String) {
    let header = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let Some(encoded) = header.strip_prefix("Basic ") else {
        return (String::new(), String::new());
    };
    let decoded = match BASE64_STANDARD
        .decode(encoded.as_bytes())
        .ok()
        .and_then(|raw| String::from_utf8(raw).ok())
    {
        Some(s) => s,
        None => return (String::new(), String::new()),
    };

    match decoded.split_once(':') {
        Some((name, password)) => (name.to_string(), password.to_string()),
        None => (decoded, String::new()),
    }
}

/// Whether the request came from a cluster peer.
fn is_internal(req: &HttpRequest, svc: &MetaService) -> bool {
    req.headers()
        .get(CLUSTER_HEADER)
        .and_then(|v| v.to_str().ok())
        == Some(svc.cluster_name())
}

/// Authorize a request: peers are trusted, clients are authenticated.
fn authorize(req: &HttpRequest, svc: &MetaService, required: &RequiredPrivileges) -> Result<()> {
    if is_internal(req, svc) {
        return Ok(());
    }
    let (name, password) = basic_credentials(req);
    svc.auth(&name, &password, required)
}

// --- users ---

#[post("/meta/users")]
async fn create_user(
    req: HttpRequest,
    svc: web::Data<MetaService>,
    body: web::Json<User>,
) -> HttpResponse {
    let user = body.into_inner();

    if user.name.is_empty() || user.password.is_empty() {
        return bad_request("name and password are required");
    }
    if !user.privilege.is_valid() {
        return bad_request("invalid privilege");
    }
    if let Err(e) = authorize(&req, &svc, &RequiredPrivileges::global(Privilege::ADMIN)) {
        return error_response(&svc, &e);
    }

    log::debug!("create user request received: {}", user.name);
    done(&svc, svc.create_user(user).await)
}

#[put("/meta/users")]
async fn set_password(
    req: HttpRequest,
    svc: web::Data<MetaService>,
    body: web::Json<User>,
) -> HttpResponse {
    let user = body.into_inner();

    if user.name.is_empty() || user.password.is_empty() {
        return bad_request("name and password are required");
    }

    // users may change their own password, everything else takes admin
    let (auth_name, auth_password) = basic_credentials(&req);
    let authorized = if auth_name.eq_ignore_ascii_case(&user.name) && !auth_name.is_empty() {
        svc.auth(&auth_name, &auth_password, &RequiredPrivileges::default())
    } else {
        authorize(&req, &svc, &RequiredPrivileges::global(Privilege::ADMIN))
    };
    if let Err(e) = authorized {
        return error_response(&svc, &e);
    }

    log::debug!("set password request received: {}", user.name);
    done(&svc, svc.set_password(&user.name, &user.password).await)
}

#[delete("/meta/users")]
async fn drop_user(
    req: HttpRequest,
    svc: web::Data<MetaService>,
    query: web::Query<NameQuery>,
) -> HttpResponse {
    if query.name.is_empty() {
        return bad_request("name is required");
    }
    if let Err(e) = authorize(&req, &svc, &RequiredPrivileges::global(Privilege::ADMIN)) {
        return error_response(&svc, &e);
    }

    log::debug!("drop user request received: {}", query.name);
    done(&svc, svc.drop_user(&query.name).await)
}

// --- databases ---

#[post("/meta/databases")]
async fn create_database(
    req: HttpRequest,
    svc: web::Data<MetaService>,
    body: web::Json<Database>,
) -> HttpResponse {
    let database = body.into_inner();

    if database.name.is_empty() {
        return bad_request("name is required");
    }
    if let Err(e) = authorize(&req, &svc, &RequiredPrivileges::global(Privilege::ADMIN)) {
        return error_response(&svc, &e);
    }

    log::debug!("create database request received: {}", database.name);
    done(&svc, svc.create_database(database).await)
}

#[delete("/meta/databases")]
async fn drop_database(
    req: HttpRequest,
    svc: web::Data<MetaService>,
    query: web::Query<NameQuery>,
) -> HttpResponse {
    if query.name.is_empty() {
        return bad_request("name is required");
    }
    if let Err(e) = authorize(&req, &svc, &RequiredPrivileges::global(Privilege::ADMIN)) {
        return error_response(&svc, &e);
    }

    log::debug!("drop database request received: {}", query.name);
    done(&svc, svc.drop_database(&query.name).await)
}

// --- nodes ---

#[post("/meta/nodes")]
async fn add_node(
    svc: web::Data<MetaService>,
    body: web::Json<JoinRequest>,
) -> HttpResponse {
    let jr = body.into_inner();

    if jr.id == 0 || jr.addr.is_empty() {
        return bad_request("invalid join request");
    }
    if jr.cluster_name != svc.cluster_name() {
        return error_response(&svc, &MetaError::ClusterNameMismatch);
    }

    log::debug!("add node request received: {} at {}", jr.id, jr.addr);

    if !svc.is_leader() {
        log::debug!("refusing to add node {}: not leader", jr.id);
        return error_response(&svc, &MetaError::NotLeader { leader: None });
    }

    done(&svc, svc.leader_add_node(jr.id, jr.addr, jr.voter).await)
}

#[delete("/meta/nodes")]
async fn drop_node(
    req: HttpRequest,
    svc: web::Data<MetaService>,
    query: web::Query<IdQuery>,
) -> HttpResponse {
    if query.id == 0 {
        return bad_request("invalid request");
    }
    if let Err(e) = authorize(&req, &svc, &RequiredPrivileges::global(Privilege::ADMIN)) {
        return error_response(&svc, &e);
    }

    log::debug!("drop node request received: {}", query.id);

    if !svc.is_leader() {
        log::debug!("refusing to drop node {}: not leader", query.id);
        return error_response(&svc, &MetaError::NotLeader { leader: None });
    }

    done(&svc, svc.leader_drop_node(query.id).await)
}

#[get("/meta/nodes")]
async fn list_nodes(svc: web::Data<MetaService>) -> HttpResponse {
    HttpResponse::Ok().json(svc.node_statuses())
}

#[post("/meta/node/heartbeat")]
async fn node_heartbeat(svc: web::Data<MetaService>, body: web::Json<NodeInfo>) -> HttpResponse {
    let hb = body.into_inner();

    // clock-skew guard
    if hb.last_heartbeat_time - Utc::now() > TimeDelta::seconds(10) {
        log::debug!("rejecting heartbeat from node {}: timestamp in the future", hb.id);
        return bad_request("heartbeat time is in the distant future");
    }

    log::debug!("heartbeat received from node {}", hb.id);
    if !svc.nodes().record_heartbeat(&hb) {
        log::debug!("heartbeat from unknown node {}", hb.id);
    }
    HttpResponse::NoContent().finish()
}

// --- raft RPCs ---

#[post("/raft/vote")]
async fn raft_vote(
    svc: web::Data<MetaService>,
    rpc: web::Json<VoteRequest<u64>>,
) -> HttpResponse {
    let res = svc.raft().vote(rpc.into_inner()).await;
    HttpResponse::Ok().json(res)
}

#[post("/raft/append")]
async fn raft_append(
    svc: web::Data<MetaService>,
    rpc: web::Json<AppendEntriesRequest<MetaTypeConfig>>,
) -> HttpResponse {
    let res = svc.raft().append_entries(rpc.into_inner()).await;
    HttpResponse::Ok().json(res)
}

#[post("/raft/snapshot")]
async fn raft_snapshot(
    svc: web::Data<MetaService>,
    rpc: web::Json<InstallSnapshotRequest<MetaTypeConfig>>,
) -> HttpResponse {
    let res = svc.raft().install_snapshot(rpc.into_inner()).await;
    HttpResponse::Ok().json(res)
}
