use crate::stats::StatsRecord;

/// Below this many hands the read is flagged as preliminary.
pub const LOW_SAMPLE_HANDS: u32 = 1000;

/// Marker the model sometimes uses to start a stats recap we do not want.
pub const STATS_RECAP_MARKER: &str = "📊 Stats";

/// Stats listed in the prompt: (record key, label, percentage).
const PROMPT_STATS: &[(&str, &str, bool)] = &[
    ("total_manos", "Hands", false),
    ("bb_100", "BB/100", false),
    ("win_usd", "Winnings USD", false),
    ("vpip", "VPIP", true),
    ("pfr", "PFR", true),
    ("three_bet", "3-Bet", true),
    ("fold_to_3bet_pct", "Fold to 3-Bet", true),
    ("four_bet_preflop_pct", "4-Bet", true),
    ("fold_to_4bet_pct", "Fold to 4-Bet", true),
    ("cbet_flop", "C-Bet Flop", true),
    ("cbet_turn", "C-Bet Turn", true),
    ("wwsf", "WWSF", true),
    ("wtsd", "WTSD", true),
    ("wsd", "WSD", true),
    ("limp_pct", "Limp Preflop", true),
    ("limp_raise_pct", "Limp-Raise", true),
    ("fold_to_flop_cbet_pct", "Fold to Flop C-Bet", true),
    ("fold_to_turn_cbet_pct", "Fold to Turn C-Bet", true),
    ("probe_bet_turn_pct", "Probe Bet Turn", true),
    ("fold_to_river_bet_pct", "Fold to River Bet", true),
    ("bet_river_pct", "Bet River", true),
    ("overbet_turn_pct", "Overbet Turn", true),
    ("overbet_river_pct", "Overbet River", true),
    ("wsdwbr_pct", "WSDwBR", true),
];

/// Describes the VPIP-PFR gap, or `None` when either stat is missing.
pub fn gap_label(stats: &StatsRecord) -> Option<&'static str> {
    let gap = stats.get_f64("vpip")? - stats.get_f64("pfr")?;
    let label = if gap < 4.0 {
        "minimal (TAG style)"
    } else if gap < 8.0 {
        "moderate"
    } else if gap < 12.0 {
        "notable (calls a lot)"
    } else {
        "extreme (very passive)"
    };
    Some(label)
}

/// Name used in the report header: the server's `player_name` when present.
pub fn report_name(stats: &StatsRecord, display_name: &str) -> String {
    stats
        .get_text("player_name")
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| display_name.to_string())
}

fn stats_list(stats: &StatsRecord) -> String {
    PROMPT_STATS
        .iter()
        .map(|(key, label, pct)| {
            let value = stats.get_text(key).unwrap_or_else(|| "0".to_string());
            let suffix = if *pct { "%" } else { "" };
            format!("- {}: {}{}", label, value, suffix)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_prompt(stats: &StatsRecord, display_name: &str) -> String {
    let name = report_name(stats, display_name);
    let gap = gap_label(stats).unwrap_or("unknown (VPIP or PFR missing)");

    format!(
        "You are a professional online cash game player (NL50-NL100). Analyse an opponent's \
statistics and write a **short, clear, actionable** report, like a note for another reg on Discord.

Direct style, no filler, no theory. Use real poker language: \"LAG\", \"gives up on the turn\", \
\"float the flop\", \"3B light\", \"CO vs BTN spots\".

Read the stats **together**, not one by one. For example:
- High VPIP + low PFR = passive.
- High flop C-Bet + low turn C-Bet = inconsistent aggression.
- High WTSD + low WSD = pays off a lot, wins little.
- Fold to 3-Bet is only a leak above 65% or below 35%, or when it does not fit the style.

VPIP-PFR gap: {gap}

If the player has fewer than {low_sample} hands, say the sample is small and the reads are preliminary.

Do not end with a list of numeric stats or a \"key stats\" section. Only the analysis.

---

EXACT REPORT FORMAT:

Report on {name}:

1. Playing style:
[Style in 1-2 lines, in terms regs use]

2. Exploitable leaks:
- [Short leak 1]
- [Short leak 2]
- [Short leak 3]

3. How to exploit:
[Concise adjustments, like \"3-bet more on the BTN\", \"float dry flops\"]

---

Available stats:
{stats}
",
        gap = gap,
        low_sample = LOW_SAMPLE_HANDS,
        name = name,
        stats = stats_list(stats),
    )
}

/// Cuts a trailing stats recap off a generated report.
pub fn strip_stats_recap(text: &str) -> String {
    match text.find(STATS_RECAP_MARKER) {
        Some(pos) => text[..pos].trim().to_string(),
        None => text.trim().to_string(),
    }
}
