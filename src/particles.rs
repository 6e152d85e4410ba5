//! Korean postposition agreement after an inserted noun.

use std::collections::HashMap;
use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ir::Edit;
use crate::textutil::{is_hangul_syllable, is_space_like, is_word_char};

/// Final-sound class of the last syllable: trailing consonant, and whether it is ㄹ.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FinalSound {
    pub has_batchim: bool,
    pub is_rieul: bool,
}

struct ParticlePair {
    plain: &'static str,
    with_batchim: &'static str,
    rieul_exception: bool,
    batchim_with_aux: bool,
}

const fn pair(
    plain: &'static str,
    with_batchim: &'static str,
    rieul_exception: bool,
    batchim_with_aux: bool,
) -> ParticlePair {
    ParticlePair {
        plain,
        with_batchim,
        rieul_exception,
        batchim_with_aux,
    }
}

static PAIRS: [ParticlePair; 14] = [
    pair("는", "은", false, true),
    pair("가", "이", false, true),
    pair("를", "을", false, true),
    pair("와", "과", false, false),
    pair("랑", "이랑", false, false),
    pair("로", "으로", true, true),
    pair("라", "이라", false, false),
    pair("였", "이었", false, false),
    pair("라고", "이라고", false, false),
    pair("라서", "이라서", false, false),
    pair("라면", "이라면", false, false),
    pair("라니", "이라니", false, false),
    pair("라도", "이라도", false, false),
    pair("의", "의", false, false),
];

const CASE_PARTICLES: [&str; 18] = [
    "에", "에서", "에게", "에게서", "와", "과", "랑", "하고", "께", "께서", "보다", "처럼", "같이",
    "로서", "으로서", "로써", "으로써", "의",
];

const AUX_PARTICLES: [&str; 12] = [
    "만", "도", "까지", "부터", "조차", "마저", "밖에", "뿐", "나", "이나", "나마", "이나마",
];

static PAIR_FORMS: Lazy<HashMap<&'static str, usize>> = Lazy::new(|| {
    let mut forms = HashMap::new();
    for (i, p) in PAIRS.iter().enumerate() {
        forms.insert(p.plain, i);
        forms.insert(p.with_batchim, i);
    }
    forms
});

/// Every particle string, longest first.
static PARTICLE_TOKENS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    let mut all: Vec<&'static str> = PAIRS
        .iter()
        .flat_map(|p| [p.plain, p.with_batchim])
        .chain(CASE_PARTICLES)
        .chain(AUX_PARTICLES)
        .collect();
    all.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then(a.cmp(b)));
    all.dedup();
    all
});

static PARTICLE_RUN_RE: Lazy<Regex> = Lazy::new(|| {
    let alt = PARTICLE_TOKENS
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    let wsz = r"[\s\x{00A0}\x{200B}\x{200C}\x{200D}\x{FEFF}]*";
    let soft = r#"["'“”’»«》〈〉」』】）)\]}]"#;
    Regex::new(&format!("^({wsz}(?:{soft})?{wsz})((?:{alt})+)")).expect("particle run regex")
});

pub fn final_sound(s: &str) -> FinalSound {
    let Some(last) = s.chars().next_back() else {
        return FinalSound::default();
    };
    if !is_hangul_syllable(last) {
        return FinalSound::default();
    }
    let jong = (last as u32 - 0xAC00) % 28;
    FinalSound {
        has_batchim: jong != 0,
        is_rieul: jong == 8,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TokenKind {
    Pair(usize),
    Single,
    Auxiliary,
    Unknown,
}

fn split_particle_run(candidate: &str) -> Vec<(&str, bool)> {
    let mut segments = Vec::new();
    let mut rest = candidate;
    while let Some(c) = rest.chars().next() {
        if is_space_like(c) {
            let end = rest
                .char_indices()
                .find(|(_, ch)| !is_space_like(*ch))
                .map_or(rest.len(), |(i, _)| i);
            segments.push((&rest[..end], true));
            rest = &rest[end..];
            continue;
        }
        let len = PARTICLE_TOKENS
            .iter()
            .find(|t| rest.starts_with(**t))
            .map_or(c.len_utf8(), |t| t.len());
        segments.push((&rest[..len], false));
        rest = &rest[len..];
    }
    segments
}

/// Picks the allomorph of every paired particle in `candidate` for the given final sound.
pub fn choose_particle(candidate: &str, sound: FinalSound) -> String {
    let segments = split_particle_run(candidate);
    let tokens: Vec<(usize, TokenKind)> = segments
        .iter()
        .enumerate()
        .filter(|(_, (_, ws))| !ws)
        .map(|(i, (seg, _))| {
            let kind = if let Some(&p) = PAIR_FORMS.get(seg) {
                TokenKind::Pair(p)
            } else if CASE_PARTICLES.contains(seg) {
                TokenKind::Single
            } else if AUX_PARTICLES.contains(seg) {
                TokenKind::Auxiliary
            } else {
                TokenKind::Unknown
            };
            (i, kind)
        })
        .collect();

    let touching = |a: usize, b: usize| {
        let (lo, hi) = (a.min(b), a.max(b));
        !(lo + 1..hi).any(|i| segments[i].1)
    };
    let aux_adjacent = |t: usize| {
        let seg = tokens[t].0;
        let left = t > 0
            && tokens[t - 1].1 == TokenKind::Auxiliary
            && touching(tokens[t - 1].0, seg);
        let right = tokens
            .get(t + 1)
            .is_some_and(|(i, k)| *k == TokenKind::Auxiliary && touching(seg, *i));
        left || right
    };

    let mut out: Vec<&str> = segments.iter().map(|(s, _)| *s).collect();
    for (t, (seg, kind)) in tokens.iter().enumerate() {
        let TokenKind::Pair(p) = kind else {
            continue;
        };
        let pair = &PAIRS[*p];
        let with_batchim = if aux_adjacent(t) && pair.batchim_with_aux {
            true
        } else if pair.rieul_exception && sound.is_rieul {
            false
        } else {
            sound.has_batchim
        };
        out[*seg] = if with_batchim { pair.with_batchim } else { pair.plain };
    }
    out.concat()
}

/// Rewrites the particle run that follows byte `end`, if any.
pub fn fix_particles(text: &str, end: usize, sound: FinalSound) -> String {
    fix_particles_before(text, end, text.len(), sound)
}

/// Like [`fix_particles`], but the run may not reach byte `limit` or beyond.
pub fn fix_particles_before(text: &str, end: usize, limit: usize, sound: FinalSound) -> String {
    let limit = limit.min(text.len());
    if end >= limit {
        return text.to_string();
    }
    let Some(tail) = text.get(end..limit) else {
        return text.to_string();
    };
    let Some(caps) = PARTICLE_RUN_RE.captures(tail) else {
        return text.to_string();
    };
    let Some(run) = caps.get(2) else {
        return text.to_string();
    };
    let old = run.as_str();
    let run_end = end + run.end();
    if old == "이" {
        if let Some(next) = text[run_end..].chars().next() {
            if is_word_char(next) || is_hangul_syllable(next) {
                return text.to_string();
            }
        }
    }
    let new = choose_particle(old, sound);
    if new == old {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len() + new.len());
    out.push_str(&text[..end + run.start()]);
    out.push_str(&new);
    out.push_str(&text[run_end..]);
    out
}

/// Result of [`replace_with_particle_fix`]. `span` covers the inserted text only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Replacement {
    pub text: String,
    pub span: Range<usize>,
    pub next: usize,
    pub edit: Edit,
}

/// Replaces `span` and fixes the particles after it.
///
/// `stops` are starts of spans in `text` that must stay untouched; the particle run is cut
/// short at the first one after `span`.
pub fn replace_with_particle_fix(
    text: &str,
    span: Range<usize>,
    replacement: &str,
    sound: Option<FinalSound>,
    stops: &[usize],
) -> Replacement {
    let mut replaced = String::with_capacity(text.len() + replacement.len());
    replaced.push_str(&text[..span.start]);
    replaced.push_str(replacement);
    replaced.push_str(&text[span.end..]);

    let canonical = span.start..span.start + replacement.len();
    let sound = sound.unwrap_or_else(|| final_sound(replacement));
    let limit = stops
        .iter()
        .filter(|&&s| s >= span.end)
        .min()
        .map_or(replaced.len(), |&s| s - span.end + canonical.end);
    let fixed = fix_particles_before(&replaced, canonical.end, limit, sound);
    let edit = Edit::between(text, &fixed, span.start, span.end, canonical.end);
    Replacement {
        text: fixed,
        next: canonical.end,
        span: canonical,
        edit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BATCHIM: FinalSound = FinalSound {
        has_batchim: true,
        is_rieul: false,
    };
    const RIEUL: FinalSound = FinalSound {
        has_batchim: true,
        is_rieul: true,
    };
    const OPEN: FinalSound = FinalSound {
        has_batchim: false,
        is_rieul: false,
    };

    #[test]
    fn final_sound_classes() {
        assert_eq!(final_sound("철수"), OPEN);
        assert_eq!(final_sound("민준"), BATCHIM);
        assert_eq!(final_sound("서울"), RIEUL);
        assert_eq!(final_sound("gray"), OPEN);
        assert_eq!(final_sound(""), OPEN);
    }

    #[test]
    fn pairs_follow_final_sound() {
        assert_eq!(choose_particle("는", BATCHIM), "은");
        assert_eq!(choose_particle("이", OPEN), "가");
        assert_eq!(choose_particle("을", OPEN), "를");
        assert_eq!(choose_particle("이랑", OPEN), "랑");
        assert_eq!(choose_particle("라고", BATCHIM), "이라고");
        assert_eq!(choose_particle("의", BATCHIM), "의");
    }

    #[test]
    fn rieul_takes_plain_ro() {
        assert_eq!(choose_particle("으로", RIEUL), "로");
        assert_eq!(choose_particle("로", BATCHIM), "으로");
        assert_eq!(choose_particle("을", RIEUL), "을");
    }

    #[test]
    fn auxiliaries_are_kept() {
        assert_eq!(choose_particle("까지", BATCHIM), "까지");
        assert_eq!(choose_particle("만을", OPEN), "만을");
        assert_eq!(choose_particle("까지만", OPEN), "까지만");
    }

    #[test]
    fn fixes_after_canonical_text() {
        assert_eq!(fix_particles("민준는 왔다", "민준".len(), BATCHIM), "민준은 왔다");
        assert_eq!(fix_particles("gray와 gray를", "gray".len(), OPEN), "gray와 gray를");
        assert_eq!(fix_particles("“민준”는", "“민준".len(), BATCHIM), "“민준”은");
    }

    #[test]
    fn lone_i_before_a_word_is_not_a_particle() {
        assert_eq!(fix_particles("철수 이름", "철수".len(), OPEN), "철수 이름");
        assert_eq!(fix_particles("철수이 왔다", "철수".len(), OPEN), "철수가 왔다");
    }

    #[test]
    fn replacement_reports_canonical_span_and_edit() {
        let r = replace_with_particle_fix("__E#1__를 봤다", 0..7, "민준", None, &[]);
        assert_eq!(r.text, "민준을 봤다");
        assert_eq!(r.span, 0.."민준".len());
        assert_eq!(r.next, "민준".len());
        assert_eq!(r.edit.old_len, "__E#1__를".len());
        assert_eq!(r.edit.new_len, "민준을".len());
    }

    #[test]
    fn particle_run_stops_at_following_span() {
        let text = "__E#1__ 가은 왔다";
        let r = replace_with_particle_fix(text, 0..7, "민준", None, &[8]);
        assert_eq!(r.text, "민준 가은 왔다");
        assert_eq!(r.edit.old_len, 7);
        assert_eq!(r.edit.new_len, "민준".len());

        let r = replace_with_particle_fix("__E#1__는 가은", 0..7, "민준", None, &[11]);
        assert_eq!(r.text, "민준은 가은");
        assert_eq!(fix_particles_before("민준가은", "민준".len(), "민준".len(), BATCHIM), "민준가은");
    }
}
