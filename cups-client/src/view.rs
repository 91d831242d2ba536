//! 终端呈现
//!
//! 把状态快照渲染成一行杯子加记分板。表现层是叶子模块，
//! 只消费快照，不参与会话逻辑。

use protocol::{GameSnapshot, Phase, PlayerId, Role};

/// 渲染一帧快照
pub fn render(state: &GameSnapshot, me: Option<PlayerId>) -> String {
    let mut out = String::new();

    // 杯子行：藏家自己的视图里用 * 标出秘密位置
    let cups: Vec<String> = (1..=state.cup_count)
        .map(|i| {
            if state.secret == Some(i) {
                format!("[{}*]", i)
            } else {
                format!("[{}]", i)
            }
        })
        .collect();
    out.push_str(&cups.join(" "));
    out.push('\n');

    for player in &state.players {
        let turn_marker = if state.turn == Some(player.id) {
            " <- turn"
        } else {
            ""
        };
        let you = if me == Some(player.id) { " (you)" } else { "" };
        out.push_str(&format!(
            "  #{} {}{} [{}] score {}{}\n",
            player.id,
            player.username,
            you,
            role_name(player.role),
            player.score,
            turn_marker,
        ));
    }

    out.push_str(&format!("  phase: {}", state.phase.name()));
    if state.phase == Phase::Finished {
        if let Some(winner) = state.winner {
            out.push_str(&format!(", winner: Player {}", winner));
        }
    }
    out
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::Hider => "hider",
        Role::Guesser => "guesser",
        Role::None => "-",
    }
}
