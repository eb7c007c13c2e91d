//! Route handling: decodes an SCGI request into one of the fixed operations,
//! runs it against the store, and renders a gemtext reply.
//!
//! Slow external work (content retrieval) always completes before the
//! storage handle is locked, so no transaction is ever held open across
//! network latency.

use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::sync::{Mutex, MutexGuard};

use percent_encoding::percent_decode_str;
use rusqlite::Connection;

use crate::config::Config;
use crate::db::StoreError;
use crate::fetch::Fetch;
use crate::gemtext::{self, ParsedPost};
use crate::messages::MessageEdit;
use crate::reconcile::{self, MessageDraft};
use crate::render;
use crate::scgi;
use crate::threads::ThreadOrder;
use crate::{links, messages, threads};

const DEFAULT_PAGE_SIZE: i64 = 100;

// Gemini status codes.
const STATUS_INPUT: u8 = 10;
const STATUS_SUCCESS: u8 = 20;
const STATUS_REDIRECT: u8 = 30;
const STATUS_TEMPORARY_FAILURE: u8 = 40;
const STATUS_FAILURE: u8 = 50;
const STATUS_NOT_FOUND: u8 = 51;
const STATUS_BAD_REQUEST: u8 = 59;

/// Everything a handler needs: immutable configuration, the shared storage
/// handle, and the content fetcher.
pub struct RouteContext<'a> {
    pub config: &'a Config,
    pub db: &'a Mutex<Connection>,
    pub fetcher: &'a dyn Fetch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Reply {
    pub(crate) status: u8,
    pub(crate) text: String,
}

impl Reply {
    fn ok(text: impl Into<String>) -> Self {
        Reply {
            status: STATUS_SUCCESS,
            text: text.into(),
        }
    }

    fn input(prompt: impl Into<String>) -> Self {
        Reply {
            status: STATUS_INPUT,
            text: prompt.into(),
        }
    }

    fn redirect(target: impl Into<String>) -> Self {
        Reply {
            status: STATUS_REDIRECT,
            text: target.into(),
        }
    }

    fn failure(text: impl Into<String>) -> Self {
        Reply {
            status: STATUS_FAILURE,
            text: text.into(),
        }
    }

    fn not_found(text: impl Into<String>) -> Self {
        Reply {
            status: STATUS_NOT_FOUND,
            text: text.into(),
        }
    }

    fn bad_request(text: impl Into<String>) -> Self {
        Reply {
            status: STATUS_BAD_REQUEST,
            text: text.into(),
        }
    }
}

/// Reads one SCGI request from the stream, dispatches it, and writes the
/// reply back. Called once per accepted connection.
pub fn handle_request<S: Read + Write>(stream: &mut S, ctx: &RouteContext<'_>) {
    let reply = match scgi::read_request(&mut *stream) {
        Ok(request) => {
            let comps: Vec<&str> = request
                .path()
                .split('/')
                .filter(|comp| !comp.is_empty())
                .collect();
            dispatch(ctx, &comps, request.query_string())
        }
        Err(err) => Reply::bad_request(err.to_string()),
    };
    if let Err(err) = scgi::write_response(stream, reply.status, &reply.text) {
        eprintln!("error writing response: {err}");
    }
}

pub(crate) fn dispatch(ctx: &RouteContext<'_>, comps: &[&str], query: &str) -> Reply {
    match comps.first().copied() {
        None | Some("help") => help_page(ctx),
        Some("threads") => threads_route(ctx, comps, query),
        Some("messages") => messages_route(ctx, comps, query),
        Some("search") => search_route(ctx, query),
        Some(_) => Reply::not_found("not found"),
    }
}

fn lock_conn<'a>(ctx: &'a RouteContext<'_>) -> Result<MutexGuard<'a, Connection>, Reply> {
    ctx.db
        .lock()
        .map_err(|_| Reply::failure("storage handle is poisoned"))
}

fn reply_for_store_error(err: StoreError) -> Reply {
    match err {
        StoreError::NotFound(_) => Reply::not_found(err.to_string()),
        _ => Reply::failure(err.to_string()),
    }
}

fn parse_query_map(query: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect()
}

/// Decodes a query string that carries a single percent-encoded URL.
fn decode_query_url(query: &str) -> Option<String> {
    percent_decode_str(query)
        .decode_utf8()
        .ok()
        .map(|decoded| decoded.into_owned())
        .filter(|decoded| !decoded.is_empty())
}

fn parse_offset_count(params: &HashMap<String, String>) -> Result<(i64, i64), Reply> {
    let mut start = 0i64;
    let mut count = DEFAULT_PAGE_SIZE;
    if let Some(raw) = params.get("start") {
        start = raw.parse().map_err(|_| {
            Reply::failure(format!("error parsing 'start' parameter '{raw}'"))
        })?;
    }
    if let Some(raw) = params.get("count") {
        count = raw.parse().map_err(|_| {
            Reply::failure(format!("error parsing 'count' parameter '{raw}'"))
        })?;
    }
    Ok((start, count))
}

/// `order` parameter: anything starting with `a`/`A` is ascending, `d`/`D`
/// descending. Absent means the route's default.
fn parse_order(params: &HashMap<String, String>, default_ascending: bool) -> Result<bool, Reply> {
    match params.get("order").map(String::as_str) {
        None | Some("") => Ok(default_ascending),
        Some(raw) if raw.to_uppercase().starts_with('A') => Ok(true),
        Some(raw) if raw.to_uppercase().starts_with('D') => Ok(false),
        Some(raw) => Err(Reply::failure(format!("error in 'order' parameter: {raw}"))),
    }
}

/// `sort` parameter for thread listings: `c...` for creation time, `u...`
/// for last-update time (the default).
fn parse_sort(params: &HashMap<String, String>) -> Result<ThreadOrder, Reply> {
    match params.get("sort").map(String::as_str) {
        None | Some("") => Ok(ThreadOrder::Updated),
        Some(raw) if raw.to_uppercase().starts_with('C') => Ok(ThreadOrder::Created),
        Some(raw) if raw.to_uppercase().starts_with('U') => Ok(ThreadOrder::Updated),
        Some(raw) => Err(Reply::failure(format!("error in 'sort' parameter: {raw}"))),
    }
}

fn help_page(ctx: &RouteContext<'_>) -> Reply {
    let template = match std::fs::read_to_string(&ctx.config.help_path) {
        Ok(text) => text,
        Err(err) if matches!(err.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied) => {
            return Reply::not_found("help file not found");
        }
        Err(_) => return Reply {
            status: STATUS_TEMPORARY_FAILURE,
            text: "temporary failure for help file".to_string(),
        },
    };
    Reply::ok(template.replace("{{server_url}}", &ctx.config.server_url))
}

fn threads_route(ctx: &RouteContext<'_>, comps: &[&str], query: &str) -> Reply {
    if comps.len() == 1 {
        return list_threads(ctx, query);
    }
    if comps[1] == "new" {
        return new_thread(ctx, query);
    }
    let thread_id: i64 = match comps[1].parse() {
        Ok(id) => id,
        Err(_) => {
            return Reply::bad_request(format!("invalid or malformed thread ID {}", comps[1]))
        }
    };
    if comps.len() == 2 {
        return view_thread(ctx, thread_id, query);
    }
    if comps[2] == "respond" {
        return respond_to_thread(ctx, thread_id, query);
    }
    Reply::bad_request(format!("invalid or malformed thread action {}", comps[2]))
}

fn list_threads(ctx: &RouteContext<'_>, query: &str) -> Reply {
    let params = parse_query_map(query);
    let (start, count) = match parse_offset_count(&params) {
        Ok(pair) => pair,
        Err(reply) => return reply,
    };
    let ascending = match parse_order(&params, false) {
        Ok(flag) => flag,
        Err(reply) => return reply,
    };
    let order = match parse_sort(&params) {
        Ok(order) => order,
        Err(reply) => return reply,
    };

    let conn = match lock_conn(ctx) {
        Ok(conn) => conn,
        Err(reply) => return reply,
    };
    let listed = match threads::list(&conn, start, count, order, ascending) {
        Ok(listed) => listed,
        Err(err) => return reply_for_store_error(err),
    };

    let mut text = String::new();
    for thread in &listed {
        text.push_str(&render::thread_line(ctx.config, thread));
    }
    text.push_str(&format!(
        "=> {}/threads/new Create a new thread\r\n",
        ctx.config.server_url
    ));
    Reply::ok(text)
}

fn new_thread(ctx: &RouteContext<'_>, query: &str) -> Reply {
    if query.is_empty() {
        return Reply::input("Please enter the URL for the new thread's initial message");
    }
    let target_url = match decode_query_url(query) {
        Some(url) => url,
        None => return Reply::bad_request(format!("unable to unescape query string: {query}")),
    };
    if !target_url.starts_with("gemini://") {
        return Reply::failure("only gemini:// URLs may be added to a gemloom server");
    }

    let draft = match retrieve_draft(ctx, &target_url) {
        Ok(draft) => draft,
        Err(reply) => return reply,
    };

    let mut conn = match lock_conn(ctx) {
        Ok(conn) => conn,
        Err(reply) => return reply,
    };
    match reconcile::create_thread(&mut conn, &draft) {
        Ok(thread_id) | Err(StoreError::AlreadyLinked { thread_id }) => Reply::redirect(format!(
            "{}/threads/{}",
            ctx.config.server_url, thread_id
        )),
        Err(err) => reply_for_store_error(err),
    }
}

fn view_thread(ctx: &RouteContext<'_>, thread_id: i64, query: &str) -> Reply {
    let params = parse_query_map(query);
    let ascending = match parse_order(&params, true) {
        Ok(flag) => flag,
        Err(reply) => return reply,
    };

    let conn = match lock_conn(ctx) {
        Ok(conn) => conn,
        Err(reply) => return reply,
    };
    let thread = match threads::find_by_id(&conn, thread_id) {
        Ok(Some(thread)) => thread,
        Ok(None) => return Reply::not_found(format!("thread {thread_id} not found")),
        Err(err) => return reply_for_store_error(err),
    };
    let listed = match links::messages_for_thread(&conn, thread_id, ascending) {
        Ok(listed) => listed,
        Err(err) => return reply_for_store_error(err),
    };

    let mut text = format!("# {} — {}\r\n", thread.author, thread.title);
    for message in &listed {
        text.push_str(&render::message_link(message));
    }
    text.push_str(&format!(
        "=> {}/threads/{}/respond Add a response to this thread\r\n",
        ctx.config.server_url, thread_id
    ));
    text.push_str(&format!(
        "=> {}/threads/ See all threads\r\n",
        ctx.config.server_url
    ));
    Reply::ok(text)
}

fn respond_to_thread(ctx: &RouteContext<'_>, thread_id: i64, query: &str) -> Reply {
    if query.is_empty() {
        return Reply::input("Please enter the URL for the response message");
    }
    let target_url = match decode_query_url(query) {
        Some(url) => url,
        None => return Reply::bad_request(format!("unable to unescape query string {query}")),
    };

    let draft = match retrieve_draft(ctx, &target_url) {
        Ok(draft) => draft,
        Err(reply) => return reply,
    };

    let mut conn = match lock_conn(ctx) {
        Ok(conn) => conn,
        Err(reply) => return reply,
    };
    match reconcile::add_response(&mut conn, thread_id, &draft) {
        Ok(_) => Reply::redirect(format!("{}/threads/{}", ctx.config.server_url, thread_id)),
        Err(err) => reply_for_store_error(err),
    }
}

/// Fetches and parses a post, turning failures and opt-outs into replies.
/// Runs entirely before any storage lock is taken.
fn retrieve_draft(ctx: &RouteContext<'_>, target_url: &str) -> Result<MessageDraft, Reply> {
    let body = ctx
        .fetcher
        .fetch(target_url)
        .map_err(|err| Reply::failure(format!("unable to retrieve {target_url}: {err}")))?;
    let post = gemtext::parse_post(target_url, &body)
        .map_err(|err| Reply::failure(format!("unable to parse {target_url} contents: {err}")))?;
    if !post.allowed {
        return Err(Reply::failure(
            "PROHIBITED: the requested page contains a gemloom:prohibit line",
        ));
    }
    Ok(draft_from_post(target_url, post))
}

fn draft_from_post(target_url: &str, post: ParsedPost) -> MessageDraft {
    MessageDraft {
        url: target_url.to_string(),
        author: post.author,
        title: post.title,
        summary: post.summary,
        dt_created: None,
    }
}

fn messages_route(ctx: &RouteContext<'_>, comps: &[&str], query: &str) -> Reply {
    if comps.len() == 1 {
        return list_messages(ctx, query);
    }
    let message_id: i64 = match comps[1].parse() {
        Ok(id) => id,
        Err(_) => {
            return Reply::bad_request(format!("invalid or malformed message ID {}", comps[1]))
        }
    };
    if comps.len() == 2 {
        return view_message(ctx, message_id);
    }
    if comps.len() == 3 && comps[2] == "update" {
        return update_message(ctx, message_id, query);
    }
    Reply::not_found("invalid message URL")
}

fn list_messages(ctx: &RouteContext<'_>, query: &str) -> Reply {
    let params = parse_query_map(query);
    let (start, count) = match parse_offset_count(&params) {
        Ok(pair) => pair,
        Err(reply) => return reply,
    };
    let ascending = match parse_order(&params, false) {
        Ok(flag) => flag,
        Err(reply) => return reply,
    };

    let conn = match lock_conn(ctx) {
        Ok(conn) => conn,
        Err(reply) => return reply,
    };
    let listed = match messages::list(&conn, start, count, ascending) {
        Ok(listed) => listed,
        Err(err) => return reply_for_store_error(err),
    };

    let mut text = String::new();
    for message in &listed {
        text.push_str(&render::message_ref(ctx.config, message));
        text.push_str(&render::message_text_block(message));
    }
    Reply::ok(text)
}

fn view_message(ctx: &RouteContext<'_>, message_id: i64) -> Reply {
    let conn = match lock_conn(ctx) {
        Ok(conn) => conn,
        Err(reply) => return reply,
    };
    let message = match messages::find_by_id(&conn, message_id) {
        Ok(Some(message)) => message,
        Ok(None) => return Reply::not_found(format!("message {message_id} not found")),
        Err(err) => return reply_for_store_error(err),
    };
    match render::message_instances(ctx.config, &conn, &message) {
        Ok(text) => Reply::ok(text),
        Err(err) => reply_for_store_error(err),
    }
}

/// Refetches a stored message's source and updates it in place. A source
/// that now opts out deletes the stored message (and its links) instead.
fn update_message(ctx: &RouteContext<'_>, message_id: i64, query: &str) -> Reply {
    if query.is_empty() {
        return Reply::input("Please enter the URL for the updated message");
    }
    let target_url = match decode_query_url(query) {
        Some(url) => url,
        None => return Reply::bad_request(format!("unable to unescape query string: {query}")),
    };
    if !target_url.starts_with("gemini://") {
        return Reply::failure("only gemini:// URLs may be added to a gemloom server");
    }

    let stored = {
        let conn = match lock_conn(ctx) {
            Ok(conn) => conn,
            Err(reply) => return reply,
        };
        match messages::find_by_id(&conn, message_id) {
            Ok(Some(message)) => message,
            Ok(None) => return Reply::not_found(format!("message {message_id} not found")),
            Err(err) => return reply_for_store_error(err),
        }
    };
    if stored.url != target_url {
        return Reply::failure("URL passed as query parameter does not match stored message URL");
    }

    let body = match ctx.fetcher.fetch(&target_url) {
        Ok(body) => body,
        Err(err) => return Reply::failure(format!("unable to retrieve {target_url}: {err}")),
    };
    let post = match gemtext::parse_post(&target_url, &body) {
        Ok(post) => post,
        Err(err) => {
            return Reply::failure(format!("unable to parse {target_url} contents: {err}"))
        }
    };

    let mut conn = match lock_conn(ctx) {
        Ok(conn) => conn,
        Err(reply) => return reply,
    };

    if !post.allowed {
        return match messages::delete(&mut conn, message_id) {
            Ok(deleted) => Reply::ok(format!(
                "Removed message with ID {deleted} from the database in response to a \
                 gemloom:prohibit line."
            )),
            Err(err) => reply_for_store_error(err),
        };
    }

    let edit = MessageEdit {
        author: &post.author,
        title: &post.title,
        summary: post.summary.as_deref(),
    };
    if let Err(err) = messages::update(&mut conn, message_id, &edit) {
        return reply_for_store_error(err);
    }
    match messages::find_by_id(&conn, message_id) {
        Ok(Some(updated)) => Reply::ok(render::message_full(ctx.config, &updated)),
        Ok(None) => Reply::not_found(format!("message {message_id} not found")),
        Err(err) => reply_for_store_error(err),
    }
}

fn search_route(ctx: &RouteContext<'_>, query: &str) -> Reply {
    if query.is_empty() {
        return Reply::input("Please enter the URL or partial URL for which to search");
    }
    let target = match decode_query_url(query) {
        Some(target) => target,
        None => return Reply::bad_request(format!("unable to unescape query string {query}")),
    };

    let conn = match lock_conn(ctx) {
        Ok(conn) => conn,
        Err(reply) => return reply,
    };
    let found = match messages::find_by_url(&conn, &target, true) {
        Ok(found) => found,
        Err(err) => return reply_for_store_error(err),
    };

    let mut text = format!("# Search results for {target}\r\n\r\n");
    for message in &found {
        match render::message_instances(ctx.config, &conn, message) {
            Ok(rendered) => text.push_str(&rendered),
            Err(err) => return reply_for_store_error(err),
        }
    }
    Reply::ok(text)
}
