/// What a zone does when its dialog is confirmed or cancelled. Explicit data
/// instead of captured callbacks; the shell executes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ZoneAction {
    Navigate { route: String },
    Toast { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct ZoneModalSpec {
    pub(crate) title: Option<String>,
    pub(crate) body: String,
    pub(crate) confirm_text: Option<String>,
    pub(crate) cancel_text: Option<String>,
    pub(crate) links: Vec<ModalLink>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TriggerZoneSpec {
    pub(crate) id: String,
    pub(crate) rect: PixelRect,
    pub(crate) message: Option<String>,
    pub(crate) modal: Option<ZoneModalSpec>,
    pub(crate) on_confirm: Option<ZoneAction>,
    pub(crate) on_cancel: Option<ZoneAction>,
    pub(crate) once: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CreatureSeed {
    pub(crate) species: CreatureSpecies,
    pub(crate) count: u32,
}

/// Inbound configuration for one world session, provided once at
/// construction.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SimConfig {
    pub(crate) player_spawn: Vec2,
    pub(crate) can_close_dialog: bool,
    pub(crate) zones: Vec<TriggerZoneSpec>,
    pub(crate) creatures: Vec<CreatureSeed>,
}

/// The outbound contracts to the rest of the application. Route changes,
/// link opening, and notification presentation all happen on the far side.
pub(crate) trait Shell {
    fn navigate_to(&mut self, route: &str);
    fn open_link(&mut self, href: &str, new_tab: bool);
    fn modal_opened(&mut self, modal: &ModalPayload);
    fn modal_closed(&mut self);
    fn proximity_hint(&mut self, hint: &ProximityHint);
    fn toast(&mut self, message: &str);
}

/// Default shell: records the hand-offs in the log. A real host would swap
/// this for route transitions and styled notifications.
#[derive(Debug, Default)]
pub(crate) struct LoggingShell;

impl Shell for LoggingShell {
    fn navigate_to(&mut self, route: &str) {
        info!(route, "navigate_out");
    }

    fn open_link(&mut self, href: &str, new_tab: bool) {
        info!(href, new_tab, "open_link");
    }

    fn modal_opened(&mut self, modal: &ModalPayload) {
        info!(body = %modal.body, "modal_opened");
    }

    fn modal_closed(&mut self) {
        debug!("modal_closed");
    }

    fn proximity_hint(&mut self, hint: &ProximityHint) {
        debug!(building = %hint.building_id, label = %hint.label, "proximity_hint");
    }

    fn toast(&mut self, message: &str) {
        info!(message, "toast");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ModalCloseKind {
    Confirm,
    Cancel,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ActiveModal {
    pub(crate) zone_id: String,
    pub(crate) payload: ModalPayload,
    pub(crate) on_confirm: Option<ZoneAction>,
    pub(crate) on_cancel: Option<ZoneAction>,
}

/// Two-stage building banner: the name lands first, the interact hint is
/// appended after a short dwell.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ProximityToast {
    pub(crate) hint: ProximityHint,
    pub(crate) age_seconds: f32,
}
