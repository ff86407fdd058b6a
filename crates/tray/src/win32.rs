//! Win32 backend: a hidden window, one `Shell_NotifyIconW` entry and popup menus.
//!
//! The window procedure never calls back into the tray, with one exception.
//! It classifies the messages the tray cares about into a thread-local queue
//! that [`NativeTray::next_event`] drains before fetching the next message;
//! everything else goes to `DefWindowProcW`. The exception is a confirmed
//! `WM_ENDSESSION`: Windows may end the process as soon as it returns, so the
//! icon is removed and the session-end hook runs right there.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::ffi::OsStr;
use std::mem;
use std::os::windows::ffi::OsStrExt;
use std::path::Path;
use std::ptr;
use std::sync::Arc;

use windows_sys::Win32::Foundation::{
    ERROR_INVALID_PARAMETER, ERROR_MENU_ITEM_NOT_FOUND, GetLastError, HINSTANCE, HWND, LPARAM,
    LRESULT, POINT, WPARAM,
};
use windows_sys::Win32::System::LibraryLoader::GetModuleHandleW;
use windows_sys::Win32::UI::Shell::{
    NIF_ICON, NIF_MESSAGE, NIF_TIP, NIM_ADD, NIM_DELETE, NIM_MODIFY, NOTIFYICONDATAW,
    Shell_NotifyIconW,
};
use windows_sys::Win32::UI::WindowsAndMessaging::{
    CW_USEDEFAULT, CreatePopupMenu, CreateWindowExW, DefWindowProcW, DestroyIcon, DestroyMenu,
    DestroyWindow, DispatchMessageW, GetCursorPos, GetMessageW, HICON, HMENU, IMAGE_ICON,
    InsertMenuItemW, IsWindow, LR_DEFAULTSIZE, LR_LOADFROMFILE, LoadImageW, MENUINFO,
    MENUITEMINFOW, MFS_CHECKED, MFS_DISABLED, MFT_SEPARATOR, MFT_STRING, MIIM_FTYPE, MIIM_ID,
    MIIM_STATE, MIIM_STRING, MIIM_SUBMENU, MIM_APPLYTOSUBMENUS, MSG, PostMessageW,
    PostQuitMessage, RegisterClassW, RegisterWindowMessageW, SetForegroundWindow, SetMenuInfo,
    SetMenuItemInfoW, TPM_BOTTOMALIGN, TPM_LEFTALIGN, TrackPopupMenu, TranslateMessage,
    UnregisterClassW, WM_APP, WM_CLOSE, WM_COMMAND, WM_DESTROY, WM_ENDSESSION, WM_LBUTTONUP,
    WM_NULL, WM_RBUTTONUP, WM_USER, WNDCLASSW, WS_OVERLAPPEDWINDOW,
};

use crate::error::NativeError;
use crate::id::ItemId;
use crate::native::{
    EntryKind, ImageHandle, MenuHandle, NativeEntry, NativeEvent, NativeTray, Pump,
    SessionEndHook, TOOLTIP_CAPACITY, Waker,
};

/// Posted by [`Win32Waker::wake`] to make the pump drain queued commands.
const WM_WAKE: u32 = WM_APP + 1;

/// Highest identifier representable in the low word of `WM_COMMAND`.
const MAX_COMMAND_ID: u32 = 0xFFFF;

/// Window and icon settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Win32Options {
    /// Class name registered for the coordination window.
    pub class_name: String,
    /// Offset from `WM_USER` of the notification icon's callback message.
    pub callback_offset: u32,
    /// `uID` of the notification icon.
    pub icon_id: u32,
}

impl Default for Win32Options {
    fn default() -> Self {
        Self {
            class_name: "SystrayClass".into(),
            callback_offset: 1,
            icon_id: 100,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowMessages {
    callback: u32,
    taskbar_created: u32,
}

thread_local! {
    static MESSAGES: Cell<WindowMessages> = const {
        Cell::new(WindowMessages { callback: 0, taskbar_created: 0 })
    };
    static PENDING: RefCell<VecDeque<NativeEvent>> = const { RefCell::new(VecDeque::new()) };
    // Window handle and icon id, for removing the icon from the window procedure.
    static ICON_TARGET: Cell<(usize, u32)> = const { Cell::new((0, 0)) };
    static SESSION_END: RefCell<Option<SessionEndHook>> = const { RefCell::new(None) };
}

/// Win32 implementation of [`NativeTray`].
pub struct Win32Tray {
    options: Win32Options,
    class_name: Vec<u16>,
    instance: HINSTANCE,
    window: HWND,
    nid: NOTIFYICONDATAW,
    root_menu: Option<HMENU>,
    images: Vec<HICON>,
}

impl Win32Tray {
    pub fn new(options: Win32Options) -> Self {
        let class_name = wide(&options.class_name);
        Self {
            options,
            class_name,
            instance: ptr::null_mut(),
            window: ptr::null_mut(),
            // SAFETY: NOTIFYICONDATAW is plain data; all-zero is its empty state.
            nid: unsafe { mem::zeroed() },
            root_menu: None,
            images: Vec::new(),
        }
    }

    pub fn options(&self) -> &Win32Options {
        &self.options
    }

    fn notify(&self, message: u32) -> Result<(), NativeError> {
        // SAFETY: `nid` is fully initialized and outlives the call.
        if unsafe { Shell_NotifyIconW(message, &self.nid) } == 0 {
            return Err(os_error("Shell_NotifyIconW"));
        }
        Ok(())
    }
}

impl Default for Win32Tray {
    fn default() -> Self {
        Self::new(Win32Options::default())
    }
}

impl NativeTray for Win32Tray {
    fn init(&mut self) -> Result<(), NativeError> {
        let taskbar_name = wide("TaskbarCreated");
        // SAFETY: the name is a NUL-terminated UTF-16 buffer.
        let taskbar_created = unsafe { RegisterWindowMessageW(taskbar_name.as_ptr()) };
        if taskbar_created == 0 {
            return Err(os_error("RegisterWindowMessageW"));
        }
        let callback = WM_USER + self.options.callback_offset;
        MESSAGES.with(|m| {
            m.set(WindowMessages {
                callback,
                taskbar_created,
            })
        });

        // SAFETY: a null module name yields the current executable.
        self.instance = unsafe { GetModuleHandleW(ptr::null()) };
        if self.instance.is_null() {
            return Err(os_error("GetModuleHandleW"));
        }

        // SAFETY: WNDCLASSW is plain data; unset fields stay zero.
        let mut class: WNDCLASSW = unsafe { mem::zeroed() };
        class.lpfnWndProc = Some(window_proc);
        class.hInstance = self.instance;
        class.lpszClassName = self.class_name.as_ptr();
        // SAFETY: `class` and the class name buffer are valid for the call.
        if unsafe { RegisterClassW(&class) } == 0 {
            return Err(os_error("RegisterClassW"));
        }

        let title = wide("");
        // SAFETY: the class was registered above; the window is never shown.
        self.window = unsafe {
            CreateWindowExW(
                0,
                self.class_name.as_ptr(),
                title.as_ptr(),
                WS_OVERLAPPEDWINDOW,
                CW_USEDEFAULT,
                CW_USEDEFAULT,
                CW_USEDEFAULT,
                CW_USEDEFAULT,
                ptr::null_mut(),
                ptr::null_mut(),
                self.instance,
                ptr::null(),
            )
        };
        if self.window.is_null() {
            let error = os_error("CreateWindowExW");
            // SAFETY: unregistering the class created above.
            unsafe { UnregisterClassW(self.class_name.as_ptr(), self.instance) };
            return Err(error);
        }

        self.nid.cbSize = mem::size_of::<NOTIFYICONDATAW>() as u32;
        self.nid.hWnd = self.window;
        self.nid.uID = self.options.icon_id;
        self.nid.uFlags = NIF_MESSAGE;
        self.nid.uCallbackMessage = callback;
        self.notify(NIM_ADD)?;
        ICON_TARGET.with(|t| t.set((self.window as usize, self.options.icon_id)));

        tracing::debug!(
            class = %self.options.class_name,
            icon_id = self.options.icon_id,
            "coordination window created"
        );
        Ok(())
    }

    fn waker(&self) -> Arc<dyn Waker> {
        Arc::new(Win32Waker {
            window: self.window as usize,
        })
    }

    fn create_menu(&mut self) -> Result<MenuHandle, NativeError> {
        // SAFETY: no preconditions.
        let menu = unsafe { CreatePopupMenu() };
        if menu.is_null() {
            return Err(os_error("CreatePopupMenu"));
        }

        // SAFETY: MENUINFO is plain data; only the mask is set.
        let mut info: MENUINFO = unsafe { mem::zeroed() };
        info.cbSize = mem::size_of::<MENUINFO>() as u32;
        info.fMask = MIM_APPLYTOSUBMENUS;
        // SAFETY: `menu` was just created and `info` is initialized.
        if unsafe { SetMenuInfo(menu, &info) } == 0 {
            let error = os_error("SetMenuInfo");
            // SAFETY: `menu` is owned here and attached to nothing.
            unsafe { DestroyMenu(menu) };
            return Err(error);
        }

        self.root_menu.get_or_insert(menu);
        Ok(MenuHandle::from_raw(menu as usize))
    }

    fn destroy_menu(&mut self, menu: MenuHandle) -> Result<(), NativeError> {
        // SAFETY: handles only come from `create_menu`.
        if unsafe { DestroyMenu(menu.raw() as HMENU) } == 0 {
            return Err(os_error("DestroyMenu"));
        }
        Ok(())
    }

    fn modify_item(&mut self, menu: MenuHandle, entry: &NativeEntry) -> Result<(), NativeError> {
        let mut title = Vec::new();
        let info = item_info(entry, &mut title)?;
        // SAFETY: `info` points into `title`, which lives until the call returns.
        let ok = unsafe { SetMenuItemInfoW(menu.raw() as HMENU, info.wID, 0, &info) };
        if ok == 0 {
            // SAFETY: no preconditions.
            let code = unsafe { GetLastError() };
            return Err(modify_failure(code, entry.id));
        }
        Ok(())
    }

    fn insert_item(
        &mut self,
        menu: MenuHandle,
        position: usize,
        entry: &NativeEntry,
    ) -> Result<(), NativeError> {
        let mut title = Vec::new();
        let info = item_info(entry, &mut title)?;
        let position = u32::try_from(position).map_err(|_| NativeError::Os {
            call: "InsertMenuItemW",
            code: ERROR_INVALID_PARAMETER,
        })?;
        // SAFETY: as in `modify_item`.
        if unsafe { InsertMenuItemW(menu.raw() as HMENU, position, 1, &info) } == 0 {
            return Err(os_error("InsertMenuItemW"));
        }
        Ok(())
    }

    fn show_menu(&mut self, menu: MenuHandle) -> Result<(), NativeError> {
        let mut point = POINT { x: 0, y: 0 };
        // SAFETY: `point` is a valid out pointer.
        if unsafe { GetCursorPos(&mut point) } == 0 {
            return Err(os_error("GetCursorPos"));
        }

        // SAFETY: `self.window` is the live coordination window.
        unsafe {
            // The popup only dismisses on outside clicks while the window is foreground.
            SetForegroundWindow(self.window);
            if TrackPopupMenu(
                menu.raw() as HMENU,
                TPM_BOTTOMALIGN | TPM_LEFTALIGN,
                point.x,
                point.y,
                0,
                self.window,
                ptr::null(),
            ) == 0
            {
                return Err(os_error("TrackPopupMenu"));
            }
            PostMessageW(self.window, WM_NULL, 0, 0);
        }
        Ok(())
    }

    fn load_image(&mut self, path: &Path) -> Result<ImageHandle, NativeError> {
        let wide_path = wide_os(path.as_os_str());
        // SAFETY: `wide_path` is NUL-terminated and outlives the call.
        let image = unsafe {
            LoadImageW(
                ptr::null_mut(),
                wide_path.as_ptr(),
                IMAGE_ICON,
                0,
                0,
                LR_LOADFROMFILE | LR_DEFAULTSIZE,
            )
        };
        if image.is_null() {
            return Err(os_error("LoadImageW"));
        }
        self.images.push(image as HICON);
        Ok(ImageHandle::from_raw(image as usize))
    }

    fn set_icon(&mut self, image: ImageHandle) -> Result<(), NativeError> {
        self.nid.hIcon = image.raw() as HICON;
        self.nid.uFlags |= NIF_ICON;
        self.notify(NIM_MODIFY)
    }

    fn set_tooltip(&mut self, tip: &[u16; TOOLTIP_CAPACITY]) -> Result<(), NativeError> {
        self.nid.szTip = *tip;
        self.nid.uFlags |= NIF_TIP;
        self.notify(NIM_MODIFY)
    }

    fn add_icon(&mut self) -> Result<(), NativeError> {
        self.notify(NIM_ADD)
    }

    fn delete_icon(&mut self) -> Result<(), NativeError> {
        self.notify(NIM_DELETE)
    }

    fn set_session_end_hook(&mut self, hook: SessionEndHook) {
        SESSION_END.with(|slot| *slot.borrow_mut() = Some(hook));
    }

    fn post_quit(&mut self) {
        // SAFETY: no preconditions.
        unsafe { PostQuitMessage(0) };
    }

    fn next_event(&mut self) -> Pump {
        loop {
            if let Some(event) = PENDING.with(|p| p.borrow_mut().pop_front()) {
                return Pump::Event(event);
            }

            // SAFETY: MSG is plain data filled in by GetMessageW.
            let mut msg: MSG = unsafe { mem::zeroed() };
            // SAFETY: `msg` is a valid out pointer; a null window reads the thread queue.
            match unsafe { GetMessageW(&mut msg, ptr::null_mut(), 0, 0) } {
                -1 => return Pump::Failed(os_error("GetMessageW")),
                0 => return Pump::Quit,
                _ => {
                    // SAFETY: `msg` was filled in by GetMessageW.
                    unsafe {
                        TranslateMessage(&msg);
                        DispatchMessageW(&msg);
                    }
                }
            }
        }
    }

    fn teardown(&mut self) {
        // SAFETY: every handle below was created by this backend on this thread.
        unsafe {
            if !self.window.is_null() && IsWindow(self.window) != 0 {
                DestroyWindow(self.window);
            }
            if let Some(menu) = self.root_menu.take() {
                // Destroys attached submenus as well.
                DestroyMenu(menu);
            }
            for image in self.images.drain(..) {
                DestroyIcon(image);
            }
            if !self.instance.is_null() {
                UnregisterClassW(self.class_name.as_ptr(), self.instance);
            }
        }
        self.window = ptr::null_mut();
        PENDING.with(|p| p.borrow_mut().clear());
        ICON_TARGET.with(|t| t.set((0, 0)));
        let hook = SESSION_END.with(|slot| slot.borrow_mut().take());
        drop(hook);
        tracing::debug!("coordination window released");
    }
}

/// Posts to the coordination window from any thread.
struct Win32Waker {
    window: usize,
}

impl Waker for Win32Waker {
    fn wake(&self) {
        // SAFETY: posting to a stale window handle fails harmlessly.
        unsafe { PostMessageW(self.window as HWND, WM_WAKE, 0, 0) };
    }

    fn close(&self) {
        // SAFETY: as in `wake`.
        unsafe { PostMessageW(self.window as HWND, WM_CLOSE, 0, 0) };
    }
}

unsafe extern "system" fn window_proc(
    window: HWND,
    message: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    match classify(message, wparam, lparam) {
        Some(event) => {
            if event == NativeEvent::SessionEnding {
                end_session();
            }
            PENDING.with(|p| p.borrow_mut().push_back(event));
            0
        }
        // SAFETY: forwarding the arguments this procedure was called with.
        None => unsafe { DefWindowProcW(window, message, wparam, lparam) },
    }
}

/// Removes the icon and runs the session-end hook before `WM_ENDSESSION` returns.
fn end_session() {
    let (window, icon_id) = ICON_TARGET.with(Cell::get);
    if window != 0 {
        // SAFETY: NOTIFYICONDATAW is plain data; NIM_DELETE reads only the
        // window and id.
        let mut nid: NOTIFYICONDATAW = unsafe { mem::zeroed() };
        nid.cbSize = mem::size_of::<NOTIFYICONDATAW>() as u32;
        nid.hWnd = window as HWND;
        nid.uID = icon_id;
        // SAFETY: `nid` is initialized and outlives the call.
        if unsafe { Shell_NotifyIconW(NIM_DELETE, &nid) } == 0 {
            tracing::debug!("tray icon already gone at session end");
        }
    }

    SESSION_END.with(|slot| match slot.try_borrow() {
        Ok(hook) => {
            if let Some(hook) = hook.as_ref() {
                hook();
            }
        }
        Err(_) => tracing::warn!("session-end hook re-entered"),
    });
}

/// Maps a window message to the event it stands for, if any.
fn classify(message: u32, wparam: WPARAM, lparam: LPARAM) -> Option<NativeEvent> {
    let messages = MESSAGES.with(Cell::get);
    match message {
        // High word zero and no control handle: the command came from a menu.
        WM_COMMAND if (wparam >> 16) & 0xFFFF == 0 && lparam == 0 => {
            Some(NativeEvent::ItemSelected((wparam & 0xFFFF) as u32))
        }
        WM_DESTROY => Some(NativeEvent::Destroyed),
        WM_ENDSESSION if wparam != 0 => Some(NativeEvent::SessionEnding),
        WM_WAKE => Some(NativeEvent::Wake),
        m if m == messages.callback && m != 0 => match lparam as u32 {
            WM_LBUTTONUP | WM_RBUTTONUP => Some(NativeEvent::MenuRequested),
            _ => None,
        },
        m if m == messages.taskbar_created && m != 0 => Some(NativeEvent::TaskbarCreated),
        _ => None,
    }
}

/// Builds the `MENUITEMINFOW` for `entry`. The title is encoded into `title`,
/// which must outlive every use of the returned struct.
fn item_info(entry: &NativeEntry, title: &mut Vec<u16>) -> Result<MENUITEMINFOW, NativeError> {
    let id = entry.id.get();
    if id > MAX_COMMAND_ID {
        return Err(NativeError::IdOutOfRange(entry.id));
    }

    // SAFETY: MENUITEMINFOW is plain data; unset fields stay zero.
    let mut info: MENUITEMINFOW = unsafe { mem::zeroed() };
    info.cbSize = mem::size_of::<MENUITEMINFOW>() as u32;
    info.wID = id;

    if entry.kind == EntryKind::Separator {
        info.fMask = MIIM_FTYPE | MIIM_ID | MIIM_STATE;
        info.fType = MFT_SEPARATOR;
        return Ok(info);
    }

    if entry.title.contains('\0') {
        return Err(NativeError::Encoding(format!(
            "menu title {:?} contains a NUL character",
            entry.title
        )));
    }
    *title = wide(&entry.title);

    info.fMask = MIIM_FTYPE | MIIM_STRING | MIIM_ID | MIIM_STATE;
    info.fType = MFT_STRING;
    info.dwTypeData = title.as_mut_ptr();
    info.cch = (title.len() - 1) as u32;
    if entry.checked {
        info.fState |= MFS_CHECKED;
    }
    if entry.disabled {
        info.fState |= MFS_DISABLED;
    }
    if let EntryKind::SubMenu(child) = entry.kind {
        info.fMask |= MIIM_SUBMENU;
        info.hSubMenu = child.raw() as HMENU;
    }
    Ok(info)
}

/// Maps a `SetMenuItemInfoW` failure code to the error the bridge acts on.
fn modify_failure(code: u32, id: ItemId) -> NativeError {
    match code {
        ERROR_MENU_ITEM_NOT_FOUND => NativeError::EntryMissing(id),
        // Some Windows builds leave the last error unset for a missing entry.
        0 => {
            tracing::debug!(
                %id,
                "SetMenuItemInfoW failed without an error code, treating entry as missing"
            );
            NativeError::EntryMissing(id)
        }
        code => NativeError::Os {
            call: "SetMenuItemInfoW",
            code,
        },
    }
}

fn os_error(call: &'static str) -> NativeError {
    // SAFETY: no preconditions.
    let code = unsafe { GetLastError() };
    NativeError::Os { call, code }
}

/// NUL-terminated UTF-16.
fn wide(text: &str) -> Vec<u16> {
    text.encode_utf16().chain(Some(0)).collect()
}

fn wide_os(text: &OsStr) -> Vec<u16> {
    text.encode_wide().chain(Some(0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u32, kind: EntryKind) -> NativeEntry {
        NativeEntry {
            id: ItemId::new(id),
            kind,
            title: "Title".into(),
            checked: true,
            disabled: false,
        }
    }

    #[test]
    fn menu_command_is_item_selection() {
        assert_eq!(
            classify(WM_COMMAND, 42, 0),
            Some(NativeEvent::ItemSelected(42))
        );
        // Accelerator notifications carry 1 in the high word.
        assert_eq!(classify(WM_COMMAND, (1 << 16) | 42, 0), None);
    }

    #[test]
    fn session_end_requires_confirmation() {
        assert_eq!(classify(WM_ENDSESSION, 1, 0), Some(NativeEvent::SessionEnding));
        assert_eq!(classify(WM_ENDSESSION, 0, 0), None);
    }

    #[test]
    fn session_end_runs_hook_before_returning() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        SESSION_END.with(|slot| {
            *slot.borrow_mut() = Some(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
        });

        // SAFETY: a null window is never dereferenced for a classified message.
        let result = unsafe { window_proc(ptr::null_mut(), WM_ENDSESSION, 1, 0) };

        assert_eq!(result, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let queued = PENDING.with(|p| p.borrow_mut().pop_front());
        assert_eq!(queued, Some(NativeEvent::SessionEnding));

        SESSION_END.with(|slot| slot.borrow_mut().take());
    }

    #[test]
    fn icon_clicks_request_menu() {
        MESSAGES.with(|m| {
            m.set(WindowMessages {
                callback: WM_USER + 1,
                taskbar_created: 0xC123,
            })
        });

        let up = WM_RBUTTONUP as LPARAM;
        assert_eq!(classify(WM_USER + 1, 0, up), Some(NativeEvent::MenuRequested));
        assert_eq!(classify(0xC123, 0, 0), Some(NativeEvent::TaskbarCreated));
        assert_eq!(classify(WM_USER + 1, 0, 0x0200), None);
    }

    #[test]
    fn item_info_encodes_state() {
        let mut title = Vec::new();
        let info = item_info(&entry(7, EntryKind::Text), &mut title).unwrap();

        assert_eq!(info.wID, 7);
        assert_eq!(info.cch, 5);
        assert_eq!(info.fState & MFS_CHECKED, MFS_CHECKED);
        assert_eq!(info.fState & MFS_DISABLED, 0);
        assert_eq!(*title.last().unwrap(), 0);
    }

    #[test]
    fn modify_failure_only_reports_missing_entries() {
        let id = ItemId::new(3);
        assert_eq!(
            modify_failure(ERROR_MENU_ITEM_NOT_FOUND, id),
            NativeError::EntryMissing(id)
        );
        assert_eq!(modify_failure(0, id), NativeError::EntryMissing(id));
        assert_eq!(
            modify_failure(5, id),
            NativeError::Os {
                call: "SetMenuItemInfoW",
                code: 5
            }
        );
    }

    #[test]
    fn item_info_rejects_wide_ids() {
        let mut title = Vec::new();
        let result = item_info(&entry(0x1_0000, EntryKind::Text), &mut title);
        assert_eq!(result.err(), Some(NativeError::IdOutOfRange(ItemId::new(0x1_0000))));
    }

    #[test]
    fn item_info_rejects_interior_nul() {
        let mut title = Vec::new();
        let mut bad = entry(1, EntryKind::Text);
        bad.title = "a\0b".into();
        assert!(matches!(
            item_info(&bad, &mut title),
            Err(NativeError::Encoding(_))
        ));
    }
}
