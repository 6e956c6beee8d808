//! Presentation table for node kinds.
//!
//! The table is inert data consumed by whatever renders the canvas. Nothing in the
//! editing engine branches on it.

use serde::Serialize;

use crate::models::NodeKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KindIcon {
    LightBulb,
    QuestionMarkCircle,
    InformationCircle,
    CheckCircle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KindPresentation {
    pub kind: NodeKind,
    pub display_name: &'static str,
    pub icon: KindIcon,
    pub accent: &'static str,
    pub background: &'static str,
    pub border: &'static str,
    pub text: &'static str,
}

/// Indexed by [`kind_index`].
static PRESENTATIONS: [KindPresentation; 5] = [
    KindPresentation {
        kind: NodeKind::Main,
        display_name: "Main",
        icon: KindIcon::LightBulb,
        accent: "yellow-500",
        background: "yellow-50",
        border: "yellow-200",
        text: "yellow-800",
    },
    KindPresentation {
        kind: NodeKind::Question,
        display_name: "Question",
        icon: KindIcon::QuestionMarkCircle,
        accent: "blue-500",
        background: "blue-50",
        border: "blue-200",
        text: "blue-800",
    },
    KindPresentation {
        kind: NodeKind::Idea,
        display_name: "Idea",
        icon: KindIcon::LightBulb,
        accent: "green-500",
        background: "green-50",
        border: "green-200",
        text: "green-800",
    },
    KindPresentation {
        kind: NodeKind::Note,
        display_name: "Note",
        icon: KindIcon::InformationCircle,
        accent: "gray-500",
        background: "gray-50",
        border: "gray-200",
        text: "gray-800",
    },
    KindPresentation {
        kind: NodeKind::Child,
        display_name: "Child node",
        icon: KindIcon::CheckCircle,
        accent: "purple-500",
        background: "white",
        border: "purple-200",
        text: "purple-800",
    },
];

const fn kind_index(kind: NodeKind) -> usize {
    match kind {
        NodeKind::Main => 0,
        NodeKind::Question => 1,
        NodeKind::Idea => 2,
        NodeKind::Note => 3,
        NodeKind::Child => 4,
    }
}

pub fn presentation(kind: NodeKind) -> &'static KindPresentation {
    &PRESENTATIONS[kind_index(kind)]
}

impl NodeKind {
    pub fn presentation(self) -> &'static KindPresentation {
        presentation(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_maps_to_its_own_row() {
        for kind in NodeKind::ALL {
            assert_eq!(presentation(kind).kind, kind);
        }
    }

    #[test]
    fn main_and_idea_share_icon_but_not_colour() {
        let main = NodeKind::Main.presentation();
        let idea = NodeKind::Idea.presentation();
        assert_eq!(main.icon, idea.icon);
        assert_ne!(main.accent, idea.accent);
    }

    #[test]
    fn child_is_the_plain_default_style() {
        let child = NodeKind::default().presentation();
        assert_eq!(child.icon, KindIcon::CheckCircle);
        assert_eq!(child.background, "white");
    }
}
