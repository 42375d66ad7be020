#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SimSystemId {
    InputIntent,
    PlayerMotion,
    CompanionFollow,
    CreatureWander,
    BuildingProximity,
    TriggerZones,
}

const SIM_SYSTEM_ORDER: [SimSystemId; 6] = [
    SimSystemId::InputIntent,
    SimSystemId::PlayerMotion,
    SimSystemId::CompanionFollow,
    SimSystemId::CreatureWander,
    SimSystemId::BuildingProximity,
    SimSystemId::TriggerZones,
];

struct SimSystemContext<'a> {
    fixed_dt_seconds: f32,
    input: &'a InputSnapshot,
    world: &'a mut WorldState,
    zones: &'a [TriggerZoneSpec],
    can_close_dialog: bool,
    rng: &'a mut SmallRng,
    shell: &'a mut dyn Shell,
    near_building: &'a mut Option<usize>,
    active_modal: &'a mut Option<ActiveModal>,
    inside_zone_ids: &'a mut HashSet<String>,
    fired_once_zone_ids: &'a mut HashSet<String>,
    has_auto_navigated: &'a mut bool,
    proximity_toast: &'a mut Option<ProximityToast>,
    interact_requested: &'a mut bool,
    auto_navigated_this_tick: &'a mut bool,
}

#[derive(Default)]
struct SimSystemsHost {
    last_tick_order: Vec<SimSystemId>,
}

impl SimSystemsHost {
    #[allow(clippy::too_many_arguments)]
    fn run_once_per_tick(
        &mut self,
        fixed_dt_seconds: f32,
        input: &InputSnapshot,
        world: &mut WorldState,
        zones: &[TriggerZoneSpec],
        can_close_dialog: bool,
        rng: &mut SmallRng,
        shell: &mut dyn Shell,
        near_building: &mut Option<usize>,
        active_modal: &mut Option<ActiveModal>,
        inside_zone_ids: &mut HashSet<String>,
        fired_once_zone_ids: &mut HashSet<String>,
        has_auto_navigated: &mut bool,
        proximity_toast: &mut Option<ProximityToast>,
        auto_navigated_this_tick: &mut bool,
    ) {
        self.last_tick_order.clear();
        let mut interact_requested = false;
        for system_id in SIM_SYSTEM_ORDER {
            self.last_tick_order.push(system_id);
            let mut context = SimSystemContext {
                fixed_dt_seconds,
                input,
                world: &mut *world,
                zones,
                can_close_dialog,
                rng: &mut *rng,
                shell: &mut *shell,
                near_building: &mut *near_building,
                active_modal: &mut *active_modal,
                inside_zone_ids: &mut *inside_zone_ids,
                fired_once_zone_ids: &mut *fired_once_zone_ids,
                has_auto_navigated: &mut *has_auto_navigated,
                proximity_toast: &mut *proximity_toast,
                interact_requested: &mut interact_requested,
                auto_navigated_this_tick: &mut *auto_navigated_this_tick,
            };
            Self::run_system(system_id, &mut context);
            // A route transition is imminent; the rest of this tick's work
            // is skipped.
            if *auto_navigated_this_tick {
                break;
            }
        }
    }

    fn run_system(system_id: SimSystemId, context: &mut SimSystemContext<'_>) {
        match system_id {
            SimSystemId::InputIntent => Self::run_input_intent_system(context),
            SimSystemId::PlayerMotion => Self::run_player_motion_system(context),
            SimSystemId::CompanionFollow => Self::run_companion_follow_system(context),
            SimSystemId::CreatureWander => Self::run_creature_wander_system(context),
            SimSystemId::BuildingProximity => Self::run_building_proximity_system(context),
            SimSystemId::TriggerZones => Self::run_trigger_zone_system(context),
        }
    }

    fn run_input_intent_system(context: &mut SimSystemContext<'_>) {
        if context.active_modal.is_some() {
            if context.input.confirm_pressed() {
                Self::close_active_modal(context, ModalCloseKind::Confirm);
            } else if context.input.cancel_pressed() && context.can_close_dialog {
                Self::close_active_modal(context, ModalCloseKind::Cancel);
            }
            return;
        }
        *context.interact_requested = context.input.interact_pressed();
    }

    fn close_active_modal(context: &mut SimSystemContext<'_>, kind: ModalCloseKind) {
        let Some(modal) = context.active_modal.take() else {
            return;
        };
        let action = match kind {
            ModalCloseKind::Confirm => modal.on_confirm,
            ModalCloseKind::Cancel => modal.on_cancel,
        };
        if let Some(action) = action {
            Self::run_zone_action(context.shell, &action);
        }
        context.shell.modal_closed();
        debug!(zone = %modal.zone_id, ?kind, "zone_modal_closed");
    }

    fn run_zone_action(shell: &mut dyn Shell, action: &ZoneAction) {
        match action {
            ZoneAction::Navigate { route } => shell.navigate_to(route),
            ZoneAction::Toast { message } => shell.toast(message),
        }
    }

    fn run_player_motion_system(context: &mut SimSystemContext<'_>) {
        let Some(direction) = context.input.direction() else {
            context.world.player.is_moving = false;
            return;
        };

        let unit = direction.unit_vector();
        let step = PLAYER_SPEED_PX_PER_SECOND * context.fixed_dt_seconds;
        let candidate = Vec2 {
            x: context.world.player.position.x + unit.x * step,
            y: context.world.player.position.y + unit.y * step,
        };
        // Facing follows intent even when the move is rejected, so the next
        // successful tick resumes in the same direction.
        context.world.player.direction = direction;

        if is_walkable(
            candidate,
            PLAYER_PROBE_HALF_EXTENT_PX,
            &context.world.grid,
            &context.world.walkable_rects,
            &context.world.buildings,
        ) {
            context.world.player.position = candidate;
            context.world.player.is_moving = true;
            context.world.player.advance_frame();
        } else {
            context.world.player.is_moving = false;
        }
    }

    fn run_companion_follow_system(context: &mut SimSystemContext<'_>) {
        let target = companion_target_for(&context.world.player);
        context.world.companion.target = Some(target);

        let current = context.world.companion.position;
        if distance_between(current, target) <= FOLLOW_EPSILON_PX {
            context.world.companion.is_moving = false;
            return;
        }

        let speed = PLAYER_SPEED_PX_PER_SECOND * COMPANION_SPEED_RATIO;
        let (next, arrived) = step_toward(
            current,
            target,
            speed,
            context.fixed_dt_seconds,
            FOLLOW_EPSILON_PX,
        );
        if !is_walkable(
            next,
            COMPANION_PROBE_HALF_EXTENT_PX,
            &context.world.grid,
            &context.world.walkable_rects,
            &context.world.buildings,
        ) {
            context.world.companion.is_moving = false;
            return;
        }

        context.world.companion.direction = dominant_axis_direction(Vec2 {
            x: next.x - current.x,
            y: next.y - current.y,
        });
        context.world.companion.position = next;
        context.world.companion.is_moving = !arrived;
        if context.world.companion.is_moving {
            context.world.companion.advance_frame();
        }
    }

    fn run_creature_wander_system(context: &mut SimSystemContext<'_>) {
        let WorldState {
            grid,
            walkable_rects,
            buildings,
            creatures,
            ..
        } = context.world;

        for creature in creatures.iter_mut() {
            let species = &creature.species;
            let agent = &mut creature.agent;

            agent.move_timer -= context.fixed_dt_seconds;
            if agent.move_timer <= 0.0 {
                let direction = Direction::ALL[context.rng.random_range(0..Direction::ALL.len())];
                let travel =
                    context
                        .rng
                        .random_range(species.wander_min_px..=species.wander_max_px);
                let unit = direction.unit_vector();
                agent.direction = direction;
                agent.target = Some(Vec2 {
                    x: agent.position.x + unit.x * travel,
                    y: agent.position.y + unit.y * travel,
                });
                agent.move_timer = context
                    .rng
                    .random_range(species.timer_min_s..=species.timer_max_s);
            }

            let Some(target) = agent.target else {
                agent.is_moving = false;
                continue;
            };

            if distance_between(agent.position, target) <= WANDER_ARRIVAL_EPSILON_PX {
                // Arrived early: cap the remaining idle so the creature does
                // not stand around for the full timer.
                agent.move_timer = agent.move_timer.min(WANDER_EARLY_ARRIVAL_CAP_S);
                agent.is_moving = false;
                continue;
            }

            let speed = AMBIENT_SPEED_PX_PER_SECOND * species.speed_factor;
            let (next, _arrived) = step_toward(
                agent.position,
                target,
                speed,
                context.fixed_dt_seconds,
                WANDER_ARRIVAL_EPSILON_PX,
            );
            if is_walkable(
                next,
                CREATURE_PROBE_HALF_EXTENT_PX,
                grid,
                walkable_rects,
                buildings,
            ) {
                agent.position = next;
                agent.is_moving = true;
                agent.advance_frame();
            } else {
                // Blocked: retarget immediately next tick.
                agent.is_moving = false;
                agent.move_timer = 0.0;
            }
        }
    }

    fn run_building_proximity_system(context: &mut SimSystemContext<'_>) {
        let player_position = context.world.player.position;

        let mut best: Option<(usize, f32)> = None;
        for (index, building) in context.world.buildings.iter().enumerate() {
            let Some(footprint) = building.footprint_px() else {
                continue;
            };
            let distance = footprint.distance_to_point(player_position);
            if distance > BUILDING_INTERACT_RADIUS_PX {
                continue;
            }
            match best {
                Some((_, best_distance)) if best_distance <= distance => {}
                _ => best = Some((index, distance)),
            }
        }
        let previous = *context.near_building;
        *context.near_building = best.map(|(index, _)| index);

        Self::update_proximity_toast(context, previous);

        // Auto-navigate: strict containment, latched to fire once until the
        // player has walked away.
        let mut inside_auto = false;
        let mut fired_route: Option<(String, String)> = None;
        for building in &context.world.buildings {
            if !building.auto_navigate {
                continue;
            }
            let Some(footprint) = building.footprint_px() else {
                continue;
            };
            if !strictly_inside(footprint, player_position) {
                continue;
            }
            inside_auto = true;
            if !*context.has_auto_navigated {
                fired_route = Some((building.id.clone(), building.route.clone()));
            }
            break;
        }
        if let Some((building_id, route)) = fired_route {
            *context.has_auto_navigated = true;
            *context.auto_navigated_this_tick = true;
            info!(building = %building_id, route = %route, "auto_navigate");
            context.shell.navigate_to(&route);
            return;
        }

        let near_auto = context
            .near_building
            .and_then(|index| context.world.buildings.get(index))
            .is_some_and(|building| building.auto_navigate);
        if *context.has_auto_navigated && !inside_auto && !near_auto {
            *context.has_auto_navigated = false;
            debug!("auto_navigate_latch_reset");
        }

        if *context.interact_requested && context.active_modal.is_none() {
            if let Some(building) = context
                .near_building
                .and_then(|index| context.world.buildings.get(index))
            {
                info!(building = %building.id, route = %building.route, "building_entered");
                context.shell.navigate_to(&building.route);
            }
        }
    }

    fn update_proximity_toast(context: &mut SimSystemContext<'_>, previous: Option<usize>) {
        match *context.near_building {
            Some(index) => {
                let Some(building) = context.world.buildings.get(index) else {
                    *context.proximity_toast = None;
                    return;
                };
                if previous != Some(index) {
                    let hint = ProximityHint {
                        building_id: building.id.clone(),
                        label: building.display_label().to_string(),
                        fill: building.fill,
                    };
                    context.shell.proximity_hint(&hint);
                    *context.proximity_toast = Some(ProximityToast {
                        hint,
                        age_seconds: 0.0,
                    });
                } else if let Some(toast) = context.proximity_toast.as_mut() {
                    toast.age_seconds += context.fixed_dt_seconds;
                }
            }
            None => *context.proximity_toast = None,
        }
    }

    fn run_trigger_zone_system(context: &mut SimSystemContext<'_>) {
        let player_position = context.world.player.position;
        let mut current: HashSet<String> = HashSet::new();
        for zone in context.zones {
            if zone.rect.contains_point(player_position) {
                current.insert(zone.id.clone());
            }
        }

        for zone in context.zones {
            let inside_now = current.contains(&zone.id);
            let was_inside = context.inside_zone_ids.contains(&zone.id);
            if !inside_now || was_inside {
                continue;
            }
            if zone.once && context.fired_once_zone_ids.contains(&zone.id) {
                continue;
            }
            // One dialog at a time: entries while a modal is open are
            // swallowed, not queued.
            if context.active_modal.is_some() {
                continue;
            }
            if zone.once {
                context.fired_once_zone_ids.insert(zone.id.clone());
            }

            let payload = build_modal_payload(zone, context.can_close_dialog);
            context.shell.modal_opened(&payload);
            info!(zone = %zone.id, "zone_modal_opened");
            *context.active_modal = Some(ActiveModal {
                zone_id: zone.id.clone(),
                payload,
                on_confirm: zone.on_confirm.clone(),
                on_cancel: zone.on_cancel.clone(),
            });
        }

        // Replaced wholesale so exit edges are observed even across
        // teleport-like jumps between zones.
        *context.inside_zone_ids = current;
    }
}

fn build_modal_payload(zone: &TriggerZoneSpec, can_close_dialog: bool) -> ModalPayload {
    let cancel_text = |explicit: Option<&str>| {
        if can_close_dialog {
            Some(explicit.unwrap_or(DEFAULT_CANCEL_TEXT).to_string())
        } else {
            None
        }
    };

    match &zone.modal {
        Some(modal) => ModalPayload {
            title: modal.title.clone(),
            body: modal.body.clone(),
            confirm_text: modal
                .confirm_text
                .clone()
                .unwrap_or_else(|| DEFAULT_CONFIRM_TEXT.to_string()),
            cancel_text: cancel_text(modal.cancel_text.as_deref()),
            links: modal.links.clone(),
        },
        None => ModalPayload {
            title: None,
            body: zone
                .message
                .clone()
                .unwrap_or_else(|| zone.id.clone()),
            confirm_text: DEFAULT_CONFIRM_TEXT.to_string(),
            cancel_text: cancel_text(None),
            links: Vec::new(),
        },
    }
}
