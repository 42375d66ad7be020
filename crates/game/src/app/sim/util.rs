fn step_toward(
    current: Vec2,
    target: Vec2,
    speed: f32,
    fixed_dt_seconds: f32,
    arrival_threshold: f32,
) -> (Vec2, bool) {
    let dx = target.x - current.x;
    let dy = target.y - current.y;
    let distance_sq = dx * dx + dy * dy;
    let threshold_sq = arrival_threshold * arrival_threshold;
    if distance_sq <= threshold_sq {
        return (target, true);
    }

    let distance = distance_sq.sqrt();
    let max_step = speed * fixed_dt_seconds;
    if max_step >= distance {
        return (target, true);
    }

    let inv_distance = distance.recip();
    (
        Vec2 {
            x: current.x + dx * inv_distance * max_step,
            y: current.y + dy * inv_distance * max_step,
        },
        false,
    )
}

fn distance_between(a: Vec2, b: Vec2) -> f32 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    (dx * dx + dy * dy).sqrt()
}

/// Facing from the dominant axis of a motion vector; horizontal wins ties.
fn dominant_axis_direction(delta: Vec2) -> Direction {
    if delta.x.abs() >= delta.y.abs() {
        if delta.x >= 0.0 {
            Direction::Right
        } else {
            Direction::Left
        }
    } else if delta.y >= 0.0 {
        Direction::Down
    } else {
        Direction::Up
    }
}

/// Strict interior test, unlike the closed containment used for walkability.
fn strictly_inside(rect: PixelRect, point: Vec2) -> bool {
    let rect = rect.normalized();
    point.x > rect.x1 && point.x < rect.x2 && point.y > rect.y1 && point.y < rect.y2
}

/// The point the companion steers for: behind the player, opposite its
/// facing, at the fixed follow distance.
fn companion_target_for(player: &Agent) -> Vec2 {
    let backward = player.direction.opposite().unit_vector();
    Vec2 {
        x: player.position.x + backward.x * FOLLOW_DISTANCE_PX,
        y: player.position.y + backward.y * FOLLOW_DISTANCE_PX,
    }
}
