//! Windows UI Automation wrapper

use windows::Win32::Foundation::POINT;
use windows::Win32::System::Com::{CoCreateInstance, CLSCTX_INPROC_SERVER};
use windows::Win32::UI::Accessibility::{
    CUIAutomation, IUIAutomation, IUIAutomationElement, IUIAutomationTreeWalker,
};

use crate::element::Descriptor;
use crate::{Error, ErrorCode, Result};

/// Deepest level `find_descendant` will walk below the window.
const MAX_SEARCH_DEPTH: usize = 32;

pub struct Automation {
    inner: IUIAutomation,
}

// The automation object is created in the MTA and is free-threaded there.
unsafe impl Send for Automation {}
unsafe impl Sync for Automation {}

impl Automation {
    pub fn new() -> Result<Self> {
        super::init_com()?;

        let automation: IUIAutomation = unsafe {
            CoCreateInstance(&CUIAutomation, None, CLSCTX_INPROC_SERVER).map_err(|e| {
                Error::new(
                    ErrorCode::ProviderUnavailable,
                    format!("Failed to create UIAutomation: {:?}", e),
                )
            })?
        };

        Ok(Self { inner: automation })
    }

    pub fn root(&self) -> Result<Element> {
        let root = unsafe {
            self.inner
                .GetRootElement()
                .map_err(|e| Error::new(ErrorCode::Unknown, format!("Failed to get root: {:?}", e)))?
        };
        Ok(Element { inner: root })
    }

    pub fn element_at(&self, x: i32, y: i32) -> Result<Element> {
        let element = unsafe {
            self.inner.ElementFromPoint(POINT { x, y }).map_err(|e| {
                Error::new(
                    ErrorCode::ElementNotFound,
                    format!("No element at ({}, {}): {:?}", x, y, e),
                )
            })?
        };
        Ok(Element { inner: element })
    }

    pub fn tree_walker(&self) -> Result<TreeWalker> {
        let walker = unsafe {
            self.inner.ControlViewWalker().map_err(|e| {
                Error::new(ErrorCode::Unknown, format!("Failed to get tree walker: {:?}", e))
            })?
        };
        Ok(TreeWalker { inner: walker })
    }
}

/// Live UI Automation element.
#[derive(Clone)]
pub struct Element {
    inner: IUIAutomationElement,
}

// Elements obtained in the MTA may be used from any MTA thread.
unsafe impl Send for Element {}

impl Element {
    pub fn name(&self) -> Option<String> {
        unsafe { self.inner.CurrentName().ok().map(|s| s.to_string()) }
    }

    pub fn control_type(&self) -> i32 {
        unsafe { self.inner.CurrentControlType().map(|ct| ct.0).unwrap_or(0) }
    }

    pub fn control_type_name(&self) -> &'static str {
        match self.control_type() {
            50000 => "Button",
            50001 => "Calendar",
            50002 => "CheckBox",
            50003 => "ComboBox",
            50004 => "Edit",
            50005 => "Hyperlink",
            50006 => "Image",
            50007 => "ListItem",
            50008 => "List",
            50009 => "Menu",
            50010 => "MenuBar",
            50011 => "MenuItem",
            50012 => "ProgressBar",
            50013 => "RadioButton",
            50014 => "ScrollBar",
            50015 => "Slider",
            50016 => "Spinner",
            50017 => "StatusBar",
            50018 => "Tab",
            50019 => "TabItem",
            50020 => "Text",
            50021 => "ToolBar",
            50022 => "ToolTip",
            50023 => "Tree",
            50024 => "TreeItem",
            50025 => "Custom",
            50026 => "Group",
            50027 => "Thumb",
            50028 => "DataGrid",
            50029 => "DataItem",
            50030 => "Document",
            50031 => "SplitButton",
            50032 => "Window",
            50033 => "Pane",
            50034 => "Header",
            50035 => "HeaderItem",
            50036 => "Table",
            50037 => "TitleBar",
            50038 => "Separator",
            _ => "Unknown",
        }
    }

    pub fn automation_id(&self) -> Option<String> {
        unsafe { self.inner.CurrentAutomationId().ok().map(|s| s.to_string()) }
    }

    pub fn class_name(&self) -> Option<String> {
        unsafe { self.inner.CurrentClassName().ok().map(|s| s.to_string()) }
    }

    /// Properties that identify this element; blank optional properties
    /// are reported as absent.
    pub fn descriptor(&self) -> Descriptor {
        Descriptor {
            name: self.name().unwrap_or_default(),
            control_type: self.control_type_name().to_string(),
            automation_id: self.automation_id().filter(|s| !s.is_empty()),
            class_name: self.class_name().filter(|s| !s.is_empty()),
        }
    }

    pub fn bounds(&self) -> Option<(i32, i32, i32, i32)> {
        unsafe {
            self.inner
                .CurrentBoundingRectangle()
                .ok()
                .map(|r| (r.left, r.top, r.right - r.left, r.bottom - r.top))
        }
    }

    pub fn clickable_point(&self) -> Option<(i32, i32)> {
        let mut point = POINT::default();

        unsafe {
            match self.inner.GetClickablePoint(&mut point) {
                Ok(got_point) if got_point.as_bool() => Some((point.x, point.y)),
                // Center of the bounding rect
                _ => self.bounds().map(|(x, y, w, h)| (x + w / 2, y + h / 2)),
            }
        }
    }

    pub fn set_focus(&self) -> Result<()> {
        unsafe {
            self.inner
                .SetFocus()
                .map_err(|e| Error::action_failed("focus", &format!("{:?}", e)))
        }
    }

    fn matches(&self, name: &str, control_type: &str) -> bool {
        self.control_type_name() == control_type && self.name().as_deref() == Some(name)
    }
}

pub struct TreeWalker {
    inner: IUIAutomationTreeWalker,
}

impl TreeWalker {
    pub fn first_child(&self, element: &Element) -> Option<Element> {
        unsafe {
            self.inner
                .GetFirstChildElement(&element.inner)
                .ok()
                .map(|e| Element { inner: e })
        }
    }

    pub fn next_sibling(&self, element: &Element) -> Option<Element> {
        unsafe {
            self.inner
                .GetNextSiblingElement(&element.inner)
                .ok()
                .map(|e| Element { inner: e })
        }
    }
}

/// Find a top-level window whose title contains `title` (case-insensitive).
pub fn find_window(automation: &Automation, title: &str) -> Result<Option<Element>> {
    let root = automation.root()?;
    let walker = automation.tree_walker()?;

    let title_lower = title.to_lowercase();
    let mut child = walker.first_child(&root);

    while let Some(element) = child {
        if let Some(window_name) = element.name() {
            if window_name.to_lowercase().contains(&title_lower) {
                return Ok(Some(element));
            }
        }
        child = walker.next_sibling(&element);
    }

    Ok(None)
}

/// Direct children of `parent`, first to last.
pub fn children(walker: &TreeWalker, parent: &Element) -> Vec<Element> {
    let mut out = Vec::new();
    let mut child = walker.first_child(parent);
    while let Some(element) = child {
        child = walker.next_sibling(&element);
        out.push(element);
    }
    out
}

/// Depth-first search under `root` for an exact name and control type match.
pub fn find_descendant(
    walker: &TreeWalker,
    root: &Element,
    name: &str,
    control_type: &str,
) -> Option<Element> {
    let mut stack: Vec<(Element, usize)> = Vec::new();
    if let Some(first) = walker.first_child(root) {
        stack.push((first, 1));
    }

    while let Some((element, depth)) = stack.pop() {
        if let Some(sibling) = walker.next_sibling(&element) {
            stack.push((sibling, depth));
        }
        if element.matches(name, control_type) {
            return Some(element);
        }
        if depth < MAX_SEARCH_DEPTH {
            if let Some(child) = walker.first_child(&element) {
                stack.push((child, depth + 1));
            }
        }
    }

    None
}
