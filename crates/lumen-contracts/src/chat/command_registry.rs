#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "load",
        action: "load_image",
    },
    CommandSpec {
        command: "use",
        action: "switch_image",
    },
    CommandSpec {
        command: "export",
        action: "export_image",
    },
    CommandSpec {
        command: "save",
        action: "save_session",
    },
    CommandSpec {
        command: "restore",
        action: "restore_session",
    },
];

/// Slider controls: `/<command> <number>`. The action is always `adjust`.
pub(crate) const NUMERIC_CONTROL_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "brightness",
        action: "brightness",
    },
    CommandSpec {
        command: "contrast",
        action: "contrast",
    },
    CommandSpec {
        command: "blur",
        action: "blur",
    },
    CommandSpec {
        command: "sharpen",
        action: "sharpen",
    },
    CommandSpec {
        command: "rotate",
        action: "rotation",
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "images",
        action: "list_images",
    },
    CommandSpec {
        command: "flip_h",
        action: "flip_horizontal",
    },
    CommandSpec {
        command: "flip_v",
        action: "flip_vertical",
    },
    CommandSpec {
        command: "reset",
        action: "reset",
    },
    CommandSpec {
        command: "controls",
        action: "show_controls",
    },
    CommandSpec {
        command: "analyze",
        action: "analyze",
    },
    CommandSpec {
        command: "wait",
        action: "wait",
    },
    CommandSpec {
        command: "suggestions",
        action: "suggestions",
    },
    CommandSpec {
        command: "history",
        action: "history",
    },
];

pub(crate) const GRAYSCALE_COMMAND: CommandSpec = CommandSpec {
    command: "grayscale",
    action: "grayscale",
};

pub(crate) const OPERATION_COMMAND: CommandSpec = CommandSpec {
    command: "op",
    action: "apply_operation",
};

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/load",
    "/images",
    "/use",
    "/brightness",
    "/contrast",
    "/blur",
    "/sharpen",
    "/rotate",
    "/grayscale",
    "/flip_h",
    "/flip_v",
    "/reset",
    "/controls",
    "/analyze",
    "/wait",
    "/suggestions",
    "/op",
    "/export",
    "/save",
    "/restore",
    "/history",
    "/help",
];
