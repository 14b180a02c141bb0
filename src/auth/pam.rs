//! Linux-PAM backend.
//!
//! Thin FFI over libpam (linked by build.rs). The session handle is wrapped so
//! `pam_end` runs exactly once, whether the session ends normally or is dropped
//! on an error path.

use std::borrow::Cow;
use std::ffi::{CStr, CString};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::ptr;

use libc::{c_char, c_int, c_void};
use log::debug;

use super::{AuthBackend, AuthSession, Conversation, MessageStyle};
use crate::error::AuthFailure;
use crate::identity::Identity;

#[allow(non_camel_case_types, dead_code)]
mod ffi {
    use libc::{c_char, c_int, c_void};

    pub const PAM_SUCCESS: c_int = 0;
    pub const PAM_BUF_ERR: c_int = 5;
    pub const PAM_CONV_ERR: c_int = 19;

    pub const PAM_PROMPT_ECHO_OFF: c_int = 1;
    pub const PAM_PROMPT_ECHO_ON: c_int = 2;
    pub const PAM_ERROR_MSG: c_int = 3;
    pub const PAM_TEXT_INFO: c_int = 4;

    #[repr(C)]
    pub struct pam_handle_t {
        _opaque: [u8; 0],
    }

    #[repr(C)]
    pub struct pam_message {
        pub msg_style: c_int,
        pub msg: *const c_char,
    }

    #[repr(C)]
    pub struct pam_response {
        pub resp: *mut c_char,
        pub resp_retcode: c_int,
    }

    pub type conv_fn = unsafe extern "C" fn(
        num_msg: c_int,
        msg: *mut *const pam_message,
        resp: *mut *mut pam_response,
        appdata_ptr: *mut c_void,
    ) -> c_int;

    #[repr(C)]
    pub struct pam_conv {
        pub conv: Option<conv_fn>,
        pub appdata_ptr: *mut c_void,
    }

    unsafe extern "C" {
        pub fn pam_start(
            service_name: *const c_char,
            user: *const c_char,
            pam_conversation: *const pam_conv,
            pamh: *mut *mut pam_handle_t,
        ) -> c_int;
        pub fn pam_end(pamh: *mut pam_handle_t, pam_status: c_int) -> c_int;
        pub fn pam_authenticate(pamh: *mut pam_handle_t, flags: c_int) -> c_int;
        pub fn pam_acct_mgmt(pamh: *mut pam_handle_t, flags: c_int) -> c_int;
        pub fn pam_strerror(pamh: *mut pam_handle_t, errnum: c_int) -> *const c_char;
    }
}

pub struct PamBackend {
    conversation: Box<dyn Conversation>,
}

impl PamBackend {
    pub fn new(conversation: Box<dyn Conversation>) -> Self {
        Self { conversation }
    }
}

/// Data behind `appdata_ptr`; boxed so its address is stable for the session.
struct ConvContext<'a> {
    conversation: &'a dyn Conversation,
}

pub struct PamSession<'a> {
    handle: *mut ffi::pam_handle_t,
    /// Last status, handed to `pam_end`.
    status: c_int,
    ended: bool,
    _conv: Box<ffi::pam_conv>,
    _context: Box<ConvContext<'a>>,
}

impl AuthBackend for PamBackend {
    type Session<'a> = PamSession<'a>;

    fn start<'a>(&'a self, service: &str, identity: &Identity) -> Result<PamSession<'a>, AuthFailure> {
        let service = CString::new(service)
            .map_err(|_| AuthFailure::Start("service name contains NUL".to_string()))?;
        let user = CString::new(identity.name())
            .map_err(|_| AuthFailure::Start("user name contains NUL".to_string()))?;

        let mut context = Box::new(ConvContext {
            conversation: self.conversation.as_ref(),
        });
        let conv = Box::new(ffi::pam_conv {
            conv: Some(converse),
            appdata_ptr: (&mut *context as *mut ConvContext<'a>).cast::<c_void>(),
        });

        let mut handle: *mut ffi::pam_handle_t = ptr::null_mut();
        // SAFETY: all pointers are valid for the call; `conv` and `context` are
        // moved into the session and outlive the handle.
        let ret = unsafe { ffi::pam_start(service.as_ptr(), user.as_ptr(), &*conv, &mut handle) };
        if ret != ffi::PAM_SUCCESS {
            let text = describe(handle, ret);
            if !handle.is_null() {
                // SAFETY: a non-null handle came from pam_start and is released once.
                unsafe { ffi::pam_end(handle, ret) };
            }
            return Err(AuthFailure::Start(text));
        }
        debug!("PAM session started");

        Ok(PamSession {
            handle,
            status: ret,
            ended: false,
            _conv: conv,
            _context: context,
        })
    }
}

impl PamSession<'_> {
    fn record(&mut self, ret: c_int) -> Result<(), String> {
        self.status = ret;
        if ret == ffi::PAM_SUCCESS {
            Ok(())
        } else {
            Err(describe(self.handle, ret))
        }
    }

    fn close(&mut self) -> c_int {
        self.ended = true;
        // SAFETY: handle is live until this single call.
        unsafe { ffi::pam_end(self.handle, self.status) }
    }
}

impl AuthSession for PamSession<'_> {
    fn authenticate(&mut self) -> Result<(), AuthFailure> {
        // SAFETY: handle is live while the session is.
        let ret = unsafe { ffi::pam_authenticate(self.handle, 0) };
        self.record(ret).map_err(AuthFailure::Credentials)
    }

    fn check_account(&mut self) -> Result<(), AuthFailure> {
        // SAFETY: handle is live while the session is.
        let ret = unsafe { ffi::pam_acct_mgmt(self.handle, 0) };
        self.record(ret).map_err(AuthFailure::Account)
    }

    fn end(mut self) -> Result<(), AuthFailure> {
        let ret = self.close();
        if ret == ffi::PAM_SUCCESS {
            debug!("PAM session ended");
            Ok(())
        } else {
            // pam_strerror does not dereference the handle on Linux-PAM.
            Err(AuthFailure::Finish(describe(ptr::null_mut(), ret)))
        }
    }
}

impl Drop for PamSession<'_> {
    fn drop(&mut self) {
        if !self.ended {
            self.close();
        }
    }
}

fn describe(handle: *mut ffi::pam_handle_t, code: c_int) -> String {
    // SAFETY: pam_strerror returns a static string or NULL.
    let text = unsafe { ffi::pam_strerror(handle, code) };
    if text.is_null() {
        return format!("PAM error {code}");
    }
    // SAFETY: non-null result is a NUL-terminated static string.
    unsafe { CStr::from_ptr(text) }
        .to_string_lossy()
        .into_owned()
}

fn message_style(raw: c_int) -> Option<MessageStyle> {
    match raw {
        ffi::PAM_PROMPT_ECHO_OFF => Some(MessageStyle::PromptEchoOff),
        ffi::PAM_PROMPT_ECHO_ON => Some(MessageStyle::PromptEchoOn),
        ffi::PAM_ERROR_MSG => Some(MessageStyle::ErrorMsg),
        ffi::PAM_TEXT_INFO => Some(MessageStyle::TextInfo),
        _ => None,
    }
}

/// Zero and free the first `filled` responses, then the array itself.
///
/// # Safety
/// `replies` must come from `calloc` with at least `filled` entries.
unsafe fn discard_replies(replies: *mut ffi::pam_response, filled: usize) {
    for i in 0..filled {
        // SAFETY: i < filled, within the allocation.
        let resp = unsafe { (*replies.add(i)).resp };
        if !resp.is_null() {
            // SAFETY: resp is a NUL-terminated malloc'd string we own.
            unsafe {
                ptr::write_bytes(resp, 0, libc::strlen(resp));
                libc::free(resp.cast::<c_void>());
            }
        }
    }
    // SAFETY: replies came from calloc.
    unsafe { libc::free(replies.cast::<c_void>()) };
}

/// Copy `answer` into a malloc'd C string and wipe the Rust copy.
fn to_c_reply(answer: String) -> Result<*mut c_char, c_int> {
    let answer = CString::new(answer).map_err(|e| {
        let mut bytes = e.into_vec();
        bytes.fill(0);
        ffi::PAM_CONV_ERR
    })?;
    // SAFETY: answer is a valid NUL-terminated string.
    let dup = unsafe { libc::strdup(answer.as_ptr()) };
    let mut bytes = answer.into_bytes();
    bytes.fill(0);
    if dup.is_null() {
        return Err(ffi::PAM_BUF_ERR);
    }
    Ok(dup)
}

unsafe extern "C" fn converse(
    num_msg: c_int,
    msg: *mut *const ffi::pam_message,
    resp: *mut *mut ffi::pam_response,
    appdata_ptr: *mut c_void,
) -> c_int {
    if num_msg <= 0 || msg.is_null() || resp.is_null() || appdata_ptr.is_null() {
        return ffi::PAM_CONV_ERR;
    }
    let count = num_msg as usize;

    // SAFETY: appdata_ptr is the ConvContext installed by `start`.
    let context = unsafe { &*appdata_ptr.cast::<ConvContext<'_>>() };

    // PAM releases the array and each string with free(3).
    // SAFETY: plain allocation, checked for NULL below.
    let replies = unsafe { libc::calloc(count, size_of::<ffi::pam_response>()) }
        .cast::<ffi::pam_response>();
    if replies.is_null() {
        return ffi::PAM_BUF_ERR;
    }

    for i in 0..count {
        // SAFETY: Linux-PAM passes an array of `num_msg` message pointers.
        let message = unsafe { *msg.add(i) };
        if message.is_null() {
            // SAFETY: `i` entries are filled.
            unsafe { discard_replies(replies, i) };
            return ffi::PAM_CONV_ERR;
        }
        // SAFETY: non-null message owned by PAM for the duration of the call.
        let message = unsafe { &*message };
        let text: Cow<'_, str> = if message.msg.is_null() {
            Cow::Borrowed("")
        } else {
            // SAFETY: PAM messages are NUL-terminated.
            unsafe { CStr::from_ptr(message.msg) }.to_string_lossy()
        };

        let Some(style) = message_style(message.msg_style) else {
            debug!("Unknown PAM message style {}", message.msg_style);
            // SAFETY: `i` entries are filled.
            unsafe { discard_replies(replies, i) };
            return ffi::PAM_CONV_ERR;
        };

        // Unwinding across the C boundary would abort the process.
        let answer = catch_unwind(AssertUnwindSafe(|| context.conversation.respond(style, &text)));
        let reply = match answer {
            Ok(Ok(Some(answer))) => to_c_reply(answer),
            Ok(Ok(None)) => Ok(ptr::null_mut()),
            Ok(Err(e)) => {
                debug!("PAM conversation failed: {e}");
                Err(ffi::PAM_CONV_ERR)
            }
            Err(_) => Err(ffi::PAM_CONV_ERR),
        };
        match reply {
            // SAFETY: i < count, within the calloc'd array.
            Ok(ptr) => unsafe { (*replies.add(i)).resp = ptr },
            Err(code) => {
                // SAFETY: `i` entries are filled.
                unsafe { discard_replies(replies, i) };
                return code;
            }
        }
    }

    // SAFETY: resp is a valid out-pointer supplied by PAM.
    unsafe { *resp = replies };
    ffi::PAM_SUCCESS
}
