use std::borrow::Cow;

use rouille::{Response, ResponseBody};
use serde::Serialize;

use adom::html_escape;
use chj_util::warn;

/// The statuses this server answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpStatus {
    Ok200,
    NotFound404,
    MethodNotAllowed405,
    InternalServerError500,
}

impl HttpStatus {
    pub fn code(self) -> u16 {
        match self {
            HttpStatus::Ok200 => 200,
            HttpStatus::NotFound404 => 404,
            HttpStatus::MethodNotAllowed405 => 405,
            HttpStatus::InternalServerError500 => 500,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            HttpStatus::Ok200 => "OK",
            HttpStatus::NotFound404 => "Not Found",
            HttpStatus::MethodNotAllowed405 => "Method Not Allowed",
            HttpStatus::InternalServerError500 => "Internal Server Error",
        }
    }

    pub fn desc(self) -> &'static str {
        match self {
            HttpStatus::Ok200 => "",
            HttpStatus::NotFound404 =>
                "The requested resource could not be found on this server.",
            HttpStatus::MethodNotAllowed405 =>
                "The request method is not supported for this resource.",
            HttpStatus::InternalServerError500 =>
                "The server encountered an error processing your request.",
        }
    }
}

pub fn html_response(status: HttpStatus, html: String) -> Response {
    Response {
        status_code: status.code(),
        headers: vec![(Cow::from("Content-Type"),
                       Cow::from("text/html; charset=utf-8"))],
        data: ResponseBody::from_string(html),
        upgrade: None,
    }
}

pub fn json_response(status: HttpStatus, value: &impl Serialize) -> Response {
    match serde_json::to_string(value) {
        Ok(s) => Response {
            status_code: status.code(),
            headers: vec![(Cow::from("Content-Type"),
                           Cow::from("application/json; charset=utf-8"))],
            data: ResponseBody::from_string(s),
            upgrade: None,
        },
        Err(e) => {
            warn!("can't serialize response: {e}");
            errorpage_from_status(HttpStatus::InternalServerError500)
        }
    }
}

pub fn errorpage_from_status(status: HttpStatus) -> Response {
    let title = status.title();
    let mut explanation = String::new();
    html_escape(status.desc(), &mut explanation);
    html_response(
        status,
        format!("<html><head><title>{title}</title></head><body><h1>{title}</h1>\
                 <p>{explanation}</p></body></html>\n"))
}
