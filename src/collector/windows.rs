//! Windows event source using low-level hooks and WinEvents.
//!
//! Keyboard input is translated to characters with `ToUnicode`, mouse input is
//! reduced to button presses, and foreground changes come from an
//! out-of-context `EVENT_SYSTEM_FOREGROUND` hook. All hooks live on one
//! dedicated thread running a message loop.

use crate::collector::types::{ForegroundChange, RawEvent, TimedEvent};
use crate::collector::{CollectorConfig, CollectorError, EventSource, EVENT_CHANNEL_CAPACITY};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use windows::core::PWSTR;
use windows::Win32::Foundation::{CloseHandle, HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::System::Threading::{
    GetCurrentThreadId, OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32,
    PROCESS_QUERY_LIMITED_INFORMATION,
};
use windows::Win32::UI::Accessibility::{SetWinEventHook, UnhookWinEvent, HWINEVENTHOOK};
use windows::Win32::UI::Input::KeyboardAndMouse::{
    GetAsyncKeyState, GetKeyState, ToUnicode, VK_CAPITAL, VK_CONTROL, VK_LCONTROL, VK_LMENU,
    VK_LSHIFT, VK_MENU, VK_RCONTROL, VK_RMENU, VK_RSHIFT, VK_SHIFT,
};
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, GetMessageW, GetWindowTextW, GetWindowThreadProcessId, PostThreadMessageW,
    SetWindowsHookExW, UnhookWindowsHookEx, EVENT_SYSTEM_FOREGROUND, HHOOK, KBDLLHOOKSTRUCT,
    MSG, OBJID_WINDOW, WH_KEYBOARD_LL, WH_MOUSE_LL, WINEVENT_OUTOFCONTEXT, WM_KEYDOWN,
    WM_LBUTTONDOWN, WM_QUIT, WM_RBUTTONDOWN, WM_SYSKEYDOWN,
};

/// The Windows event source.
pub struct WindowsSource {
    config: CollectorConfig,
    sender: Sender<TimedEvent>,
    receiver: Receiver<TimedEvent>,
    running: Arc<AtomicBool>,
    hook_thread_id: Arc<AtomicU32>,
    thread_handle: Option<JoinHandle<()>>,
}

impl WindowsSource {
    /// Create a new Windows source with the given configuration.
    pub fn new(config: CollectorConfig) -> Self {
        // Use a bounded channel to prevent unbounded memory growth
        let (sender, receiver) = bounded(EVENT_CHANNEL_CAPACITY);

        Self {
            config,
            sender,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            hook_thread_id: Arc::new(AtomicU32::new(0)),
            thread_handle: None,
        }
    }
}

impl EventSource for WindowsSource {
    /// Install the hooks on a background thread.
    ///
    /// Blocks until the thread reports whether every requested hook was
    /// registered, so a failed registration is returned here rather than
    /// leaving a half-initialized source behind.
    fn start(&mut self) -> Result<(), CollectorError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CollectorError::AlreadyRunning);
        }

        let sender = self.sender.clone();
        let running = self.running.clone();
        let thread_id = self.hook_thread_id.clone();
        let config = self.config.clone();
        let (ready_tx, ready_rx) = bounded::<Result<(), CollectorError>>(1);

        let handle = thread::spawn(move || {
            thread_id.store(unsafe { GetCurrentThreadId() }, Ordering::SeqCst);
            run_hook_loop(sender, running, config, ready_tx);
        });

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.running.store(true, Ordering::SeqCst);
                self.thread_handle = Some(handle);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(CollectorError::HookRegistration { hook: "message loop" })
            }
        }
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            // GetMessageW blocks, so wake the loop with WM_QUIT
            let thread_id = self.hook_thread_id.load(Ordering::SeqCst);
            unsafe {
                let _ = PostThreadMessageW(thread_id, WM_QUIT, WPARAM(0), LPARAM(0));
            }
            let _ = handle.join();
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn receiver(&self) -> &Receiver<TimedEvent> {
        &self.receiver
    }
}

impl Drop for WindowsSource {
    fn drop(&mut self) {
        self.stop();
    }
}

thread_local! {
    static EVENT_SENDER: std::cell::RefCell<Option<Sender<TimedEvent>>> = const { std::cell::RefCell::new(None) };
}

fn forward(event: RawEvent) {
    EVENT_SENDER.with(|sender| {
        if let Some(ref s) = *sender.borrow() {
            // Never block the hook; a full channel drops the event
            let _ = s.try_send(TimedEvent::now(event));
        }
    });
}

/// Modifier keys whose held state feeds `ToUnicode`.
const MODIFIER_KEYS: [u16; 9] = [
    VK_SHIFT.0,
    VK_LSHIFT.0,
    VK_RSHIFT.0,
    VK_CONTROL.0,
    VK_LCONTROL.0,
    VK_RCONTROL.0,
    VK_MENU.0,
    VK_LMENU.0,
    VK_RMENU.0,
];

/// `ToUnicode` flag: leave the kernel keyboard state (dead keys) untouched.
const TO_UNICODE_KEEP_STATE: u32 = 0x4;

/// Build a key-state table from modifier and Caps Lock state.
///
/// The hook thread has no input focus, so its own `GetKeyboardState` would
/// not see the user's modifiers.
fn modifier_key_state(is_held: impl Fn(u16) -> bool, caps_lock: bool) -> [u8; 256] {
    let mut state = [0u8; 256];
    for key in MODIFIER_KEYS {
        if is_held(key) {
            state[key as usize] = 0x80;
        }
    }
    if caps_lock {
        state[VK_CAPITAL.0 as usize] = 0x01;
    }
    state
}

/// Low-level keyboard hook callback.
unsafe extern "system" fn keyboard_hook_proc(
    n_code: i32,
    w_param: WPARAM,
    l_param: LPARAM,
) -> LRESULT {
    if n_code >= 0 && matches!(w_param.0 as u32, WM_KEYDOWN | WM_SYSKEYDOWN) {
        let kb_struct = &*(l_param.0 as *const KBDLLHOOKSTRUCT);
        let key_state = modifier_key_state(
            |key| GetAsyncKeyState(key as i32) as u16 & 0x8000 != 0,
            GetKeyState(VK_CAPITAL.0 as i32) & 1 != 0,
        );
        let mut buffer = [0u16; 8];
        let written = ToUnicode(
            kb_struct.vkCode,
            kb_struct.scanCode,
            Some(&key_state),
            &mut buffer,
            TO_UNICODE_KEEP_STATE,
        );
        if written > 0 {
            for c in char::decode_utf16(buffer[..written as usize].iter().copied()).flatten() {
                forward(RawEvent::Text(c));
            }
        }
    }

    CallNextHookEx(HHOOK::default(), n_code, w_param, l_param)
}

/// Low-level mouse hook callback. Only button presses are forwarded.
unsafe extern "system" fn mouse_hook_proc(
    n_code: i32,
    w_param: WPARAM,
    l_param: LPARAM,
) -> LRESULT {
    if n_code >= 0 && matches!(w_param.0 as u32, WM_LBUTTONDOWN | WM_RBUTTONDOWN) {
        forward(RawEvent::Click);
    }

    CallNextHookEx(HHOOK::default(), n_code, w_param, l_param)
}

/// WinEvent callback for foreground changes.
unsafe extern "system" fn foreground_event_proc(
    _hook: HWINEVENTHOOK,
    event: u32,
    hwnd: HWND,
    id_object: i32,
    _id_child: i32,
    _event_thread: u32,
    _event_time: u32,
) {
    // Child objects and non-foreground events are not transitions
    if event != EVENT_SYSTEM_FOREGROUND || id_object != OBJID_WINDOW.0 || hwnd.0.is_null() {
        return;
    }

    let mut change = ForegroundChange::new(hwnd.0 as usize as u64);
    change.title = window_title(hwnd);
    change.process_name = process_name(hwnd);
    forward(RawEvent::Foreground(change));
}

unsafe fn window_title(hwnd: HWND) -> Option<String> {
    let mut buffer = [0u16; 512];
    let len = GetWindowTextW(hwnd, &mut buffer);
    if len <= 0 {
        return None;
    }
    Some(String::from_utf16_lossy(&buffer[..len as usize]))
}

unsafe fn process_name(hwnd: HWND) -> Option<String> {
    let mut pid = 0u32;
    GetWindowThreadProcessId(hwnd, Some(&mut pid));
    if pid == 0 {
        return None;
    }

    let process = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid).ok()?;
    let mut buffer = [0u16; 1024];
    let mut len = buffer.len() as u32;
    let result = QueryFullProcessImageNameW(
        process,
        PROCESS_NAME_WIN32,
        PWSTR(buffer.as_mut_ptr()),
        &mut len,
    );
    let _ = CloseHandle(process);
    result.ok()?;

    let path = String::from_utf16_lossy(&buffer[..len as usize]);
    Path::new(&path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

/// Install hooks, report readiness, then pump messages until WM_QUIT.
fn run_hook_loop(
    sender: Sender<TimedEvent>,
    running: Arc<AtomicBool>,
    config: CollectorConfig,
    ready: Sender<Result<(), CollectorError>>,
) {
    EVENT_SENDER.with(|s| {
        *s.borrow_mut() = Some(sender);
    });

    unsafe {
        let mut hooks: Vec<HHOOK> = Vec::new();
        let mut win_event_hook: Option<HWINEVENTHOOK> = None;

        let release = |hooks: Vec<HHOOK>, win_event_hook: Option<HWINEVENTHOOK>| {
            for hook in hooks {
                let _ = UnhookWindowsHookEx(hook);
            }
            if let Some(hook) = win_event_hook {
                let _ = UnhookWinEvent(hook);
            }
        };

        if config.capture_keyboard {
            match SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_hook_proc), None, 0) {
                Ok(hook) => hooks.push(hook),
                Err(_) => {
                    release(hooks, win_event_hook);
                    let _ = ready.send(Err(CollectorError::HookRegistration { hook: "keyboard" }));
                    return;
                }
            }
        }

        if config.capture_mouse {
            match SetWindowsHookExW(WH_MOUSE_LL, Some(mouse_hook_proc), None, 0) {
                Ok(hook) => hooks.push(hook),
                Err(_) => {
                    release(hooks, win_event_hook);
                    let _ = ready.send(Err(CollectorError::HookRegistration { hook: "mouse" }));
                    return;
                }
            }
        }

        if config.capture_window {
            let hook = SetWinEventHook(
                EVENT_SYSTEM_FOREGROUND,
                EVENT_SYSTEM_FOREGROUND,
                None,
                Some(foreground_event_proc),
                0,
                0,
                WINEVENT_OUTOFCONTEXT,
            );
            if hook.is_invalid() {
                release(hooks, win_event_hook);
                let _ = ready.send(Err(CollectorError::HookRegistration { hook: "foreground" }));
                return;
            }
            win_event_hook = Some(hook);
        }

        running.store(true, Ordering::SeqCst);
        let _ = ready.send(Ok(()));

        // Hooks are dispatched from inside GetMessageW
        let mut msg = MSG::default();
        while running.load(Ordering::SeqCst) {
            let result = GetMessageW(&mut msg, HWND::default(), 0, 0);
            if result.0 <= 0 {
                // WM_QUIT or error
                break;
            }
        }

        release(hooks, win_event_hook);
    }

    EVENT_SENDER.with(|s| {
        *s.borrow_mut() = None;
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_creation() {
        let source = WindowsSource::new(CollectorConfig::default());
        assert!(!source.is_running());
    }

    #[test]
    fn test_stop_without_start() {
        let mut source = WindowsSource::new(CollectorConfig::default());
        source.stop();
        assert!(!source.is_running());
    }

    #[test]
    fn test_modifier_key_state() {
        let state = modifier_key_state(|key| key == VK_LSHIFT.0 || key == VK_SHIFT.0, true);
        assert_eq!(state[VK_SHIFT.0 as usize], 0x80);
        assert_eq!(state[VK_LSHIFT.0 as usize], 0x80);
        assert_eq!(state[VK_RSHIFT.0 as usize], 0);
        assert_eq!(state[VK_CAPITAL.0 as usize], 0x01);

        let idle = modifier_key_state(|_| false, false);
        assert!(idle.iter().all(|&b| b == 0));
    }
}
