pub(crate) struct TownSimulation {
    config: SimConfig,
    shell: Box<dyn Shell>,
    rng: SmallRng,
    near_building: Option<usize>,
    active_modal: Option<ActiveModal>,
    inside_zone_ids: HashSet<String>,
    fired_once_zone_ids: HashSet<String>,
    has_auto_navigated: bool,
    proximity_toast: Option<ProximityToast>,
    systems_host: SimSystemsHost,
}

impl TownSimulation {
    pub(crate) fn new(config: SimConfig, shell: Box<dyn Shell>, rng_seed: u64) -> Self {
        Self {
            config,
            shell,
            rng: SmallRng::seed_from_u64(rng_seed),
            near_building: None,
            active_modal: None,
            inside_zone_ids: HashSet::new(),
            fired_once_zone_ids: HashSet::new(),
            has_auto_navigated: false,
            proximity_toast: None,
            systems_host: SimSystemsHost::default(),
        }
    }

    fn reset_session_state(&mut self) {
        self.near_building = None;
        self.active_modal = None;
        self.inside_zone_ids.clear();
        self.fired_once_zone_ids.clear();
        self.has_auto_navigated = false;
        self.proximity_toast = None;
    }

    fn spawn_creatures(&mut self, world: &mut WorldState) {
        world.creatures.clear();
        let seeds = self.config.creatures.clone();
        for seed in &seeds {
            for _ in 0..seed.count {
                let position = place_creature(&mut self.rng, world);
                let mut agent = Agent::at(position);
                agent.move_timer = self
                    .rng
                    .random_range(seed.species.timer_min_s..=seed.species.timer_max_s);
                world.creatures.push(Creature {
                    agent,
                    species: seed.species.clone(),
                });
            }
        }
    }
}

/// Rejection-samples a walkable cell center; a pathological map falls back
/// to the map center so initialization never fails.
fn place_creature(rng: &mut SmallRng, world: &WorldState) -> Vec2 {
    for _ in 0..CREATURE_PLACEMENT_ATTEMPTS {
        let x = rng.random_range(0..world.grid.width());
        let y = rng.random_range(0..world.grid.height());
        let candidate = Vec2 {
            x: (x as f32 + 0.5) * TILE_SIZE_PX,
            y: (y as f32 + 0.5) * TILE_SIZE_PX,
        };
        if is_walkable(
            candidate,
            CREATURE_PROBE_HALF_EXTENT_PX,
            &world.grid,
            &world.walkable_rects,
            &world.buildings,
        ) {
            return candidate;
        }
    }
    warn!("creature_placement_exhausted_falling_back_to_center");
    world.grid.center_px()
}

impl Simulation for TownSimulation {
    fn load(&mut self, world: &mut WorldState) {
        self.reset_session_state();
        world.player = Agent::at(self.config.player_spawn);
        // The companion starts parked at its follow point behind the
        // default (down) facing.
        world.companion = Agent::at(companion_target_for(&world.player));
        self.spawn_creatures(world);
        info!(
            zones = self.config.zones.len(),
            creatures = world.creatures.len(),
            "session_started"
        );
    }

    fn update(
        &mut self,
        fixed_dt_seconds: f32,
        input: &InputSnapshot,
        world: &mut WorldState,
    ) -> SimCommand {
        if input.quit_requested() {
            return SimCommand::Quit;
        }

        let mut auto_navigated_this_tick = false;
        self.systems_host.run_once_per_tick(
            fixed_dt_seconds,
            input,
            world,
            &self.config.zones,
            self.config.can_close_dialog,
            &mut self.rng,
            self.shell.as_mut(),
            &mut self.near_building,
            &mut self.active_modal,
            &mut self.inside_zone_ids,
            &mut self.fired_once_zone_ids,
            &mut self.has_auto_navigated,
            &mut self.proximity_toast,
            &mut auto_navigated_this_tick,
        );

        if auto_navigated_this_tick {
            SimCommand::SkipRender
        } else {
            SimCommand::None
        }
    }

    fn unload(&mut self, world: &mut WorldState) {
        world.creatures.clear();
        self.reset_session_state();
        info!("session_ended");
    }

    fn modal_panel(&self) -> Option<ModalPayload> {
        self.active_modal
            .as_ref()
            .map(|modal| modal.payload.clone())
    }

    fn toast_banner(&self) -> Option<ToastBanner> {
        let toast = self.proximity_toast.as_ref()?;
        let detail = (toast.age_seconds >= PROXIMITY_HINT_STAGE_TWO_S)
            .then(|| INTERACT_HINT_TEXT.to_string());
        Some(ToastBanner {
            headline: toast.hint.label.clone(),
            detail,
            accent: toast.hint.fill,
        })
    }

    fn diagnostics_lines(&self, world: &WorldState) -> Vec<String> {
        vec![
            match self
                .near_building
                .and_then(|index| world.buildings.get(index))
            {
                Some(building) => format!("near: {}", building.id),
                None => "near: none".to_string(),
            },
            format!(
                "zones in/fired: {}/{}",
                self.inside_zone_ids.len(),
                self.fired_once_zone_ids.len()
            ),
            format!(
                "modal: {}",
                match &self.active_modal {
                    Some(modal) => modal.zone_id.as_str(),
                    None => "none",
                }
            ),
        ]
    }
}
