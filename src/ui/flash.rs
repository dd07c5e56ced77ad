//! One-shot notices carried across a redirect in a cookie.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

pub const FLASH_COOKIE: &str = "todolist_flash";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashKind {
    Success,
    Error,
}

impl FlashKind {
    fn tag(self) -> char {
        match self {
            FlashKind::Success => 's',
            FlashKind::Error => 'e',
        }
    }

    fn from_tag(tag: char) -> Option<Self> {
        match tag {
            's' => Some(FlashKind::Success),
            'e' => Some(FlashKind::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flash {
    pub kind: FlashKind,
    pub message: String,
}

impl Flash {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Error,
            message: message.into(),
        }
    }

    /// CSS class used by the templates
    pub fn css_class(&self) -> &'static str {
        match self.kind {
            FlashKind::Success => "flash flash-success",
            FlashKind::Error => "flash flash-error",
        }
    }

    fn encode(&self) -> String {
        let mut raw = String::with_capacity(self.message.len() + 1);
        raw.push(self.kind.tag());
        raw.push_str(&self.message);
        URL_SAFE_NO_PAD.encode(raw)
    }

    fn decode(value: &str) -> Option<Self> {
        let bytes = URL_SAFE_NO_PAD.decode(value).ok()?;
        let raw = String::from_utf8(bytes).ok()?;
        let mut chars = raw.chars();
        let kind = FlashKind::from_tag(chars.next()?)?;
        Some(Self {
            kind,
            message: chars.as_str().to_string(),
        })
    }
}

/// Queue a flash for the next rendered page
pub fn push(jar: CookieJar, flash: Flash, secure: bool) -> CookieJar {
    jar.add(
        Cookie::build((FLASH_COOKIE, flash.encode()))
            .path("/")
            .http_only(true)
            .secure(secure)
            .same_site(SameSite::Lax)
            .build(),
    )
}

/// Read the pending flash, if any, and clear it
pub fn take(jar: CookieJar) -> (CookieJar, Option<Flash>) {
    let flash = match jar.get(FLASH_COOKIE) {
        Some(cookie) => Flash::decode(cookie.value()),
        None => return (jar, None),
    };
    let jar = jar.remove(Cookie::build((FLASH_COOKIE, "")).path("/").build());
    (jar, flash)
}
