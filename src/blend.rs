//! Per-pixel blend modes over straight (non-premultiplied) RGBA8.
//!
//! Every mode has the same shape, `fn(backdrop, source, opacity) -> RGBA8`.
//! Separable modes mix RGB channel by channel. The HSL family works on whole
//! RGB triples. Either way the mixed color is then composited onto the
//! backdrop with [`normal`] using the source's own alpha.

use rgb::RGBA8;

use crate::document::BlendMode;

/// A blend function: backdrop, source, opacity.
pub type BlendFn = fn(RGBA8, RGBA8, u8) -> RGBA8;

/// Fixed-point `a * b / 255`, rounded to nearest.
///
/// ```
/// use aseprite_atlas::blend::combine;
/// assert_eq!(combine(255, 77), 77);
/// assert_eq!(combine(0, 77), 0);
/// assert_eq!(combine(128, 255), 128);
/// ```
pub fn combine(a: u8, b: u8) -> u8 {
    mul_un8(i32::from(a), i32::from(b)) as u8
}

fn mul_un8(a: i32, b: i32) -> i32 {
    let t = a * b + 0x80;
    ((t >> 8) + t) >> 8
}

/// `a * 255 / b`, rounded. `b` must be non-zero.
fn div_un8(a: i32, b: i32) -> i32 {
    (a * 0xff + b / 2) / b
}

/// Blends `source` over `backdrop` with `mode` at the given opacity.
///
/// A fully transparent source leaves the backdrop untouched, and a fully
/// transparent backdrop takes the source with its alpha scaled by opacity.
pub fn blend(mode: BlendMode, backdrop: RGBA8, source: RGBA8, opacity: u8) -> RGBA8 {
    if source.a == 0 {
        return backdrop;
    }
    if backdrop.a == 0 {
        return RGBA8 {
            a: combine(source.a, opacity),
            ..source
        };
    }
    blend_fn(mode)(backdrop, source, opacity)
}

/// The function implementing `mode`.
pub fn blend_fn(mode: BlendMode) -> BlendFn {
    match mode {
        BlendMode::Normal => normal,
        BlendMode::Multiply => multiply,
        BlendMode::Screen => screen,
        BlendMode::Overlay => overlay,
        BlendMode::Darken => darken,
        BlendMode::Lighten => lighten,
        BlendMode::ColorDodge => color_dodge,
        BlendMode::ColorBurn => color_burn,
        BlendMode::HardLight => hard_light,
        BlendMode::SoftLight => soft_light,
        BlendMode::Difference => difference,
        BlendMode::Exclusion => exclusion,
        BlendMode::Hue => hue,
        BlendMode::Saturation => saturation,
        BlendMode::Color => color,
        BlendMode::Luminosity => luminosity,
        BlendMode::Addition => addition,
        BlendMode::Subtract => subtract,
        BlendMode::Divide => divide,
    }
}

/// Source-over with the source alpha scaled by `opacity`.
pub fn normal(backdrop: RGBA8, source: RGBA8, opacity: u8) -> RGBA8 {
    if backdrop.a == 0 {
        return RGBA8 {
            a: combine(source.a, opacity),
            ..source
        };
    }
    if source.a == 0 {
        return backdrop;
    }

    let ba = i32::from(backdrop.a);
    let sa = mul_un8(i32::from(source.a), i32::from(opacity));
    let ra = sa + ba - mul_un8(ba, sa);
    let mix = |b: u8, s: u8| {
        let b = i32::from(b);
        (b + (i32::from(s) - b) * sa / ra) as u8
    };
    RGBA8::new(
        mix(backdrop.r, source.r),
        mix(backdrop.g, source.g),
        mix(backdrop.b, source.b),
        ra as u8,
    )
}

fn separable(backdrop: RGBA8, source: RGBA8, opacity: u8, f: fn(i32, i32) -> i32) -> RGBA8 {
    let channel = |b: u8, s: u8| f(i32::from(b), i32::from(s)).clamp(0, 255) as u8;
    let mixed = RGBA8::new(
        channel(backdrop.r, source.r),
        channel(backdrop.g, source.g),
        channel(backdrop.b, source.b),
        source.a,
    );
    normal(backdrop, mixed, opacity)
}

fn multiply_channel(b: i32, s: i32) -> i32 {
    mul_un8(b, s)
}

fn screen_channel(b: i32, s: i32) -> i32 {
    b + s - mul_un8(b, s)
}

fn hard_light_channel(b: i32, s: i32) -> i32 {
    if s < 128 {
        multiply_channel(b, s << 1)
    } else {
        screen_channel(b, (s << 1) - 255)
    }
}

pub fn multiply(backdrop: RGBA8, source: RGBA8, opacity: u8) -> RGBA8 {
    separable(backdrop, source, opacity, multiply_channel)
}

pub fn screen(backdrop: RGBA8, source: RGBA8, opacity: u8) -> RGBA8 {
    separable(backdrop, source, opacity, screen_channel)
}

/// Hard light with the roles of backdrop and source swapped.
pub fn overlay(backdrop: RGBA8, source: RGBA8, opacity: u8) -> RGBA8 {
    separable(backdrop, source, opacity, |b, s| hard_light_channel(s, b))
}

pub fn darken(backdrop: RGBA8, source: RGBA8, opacity: u8) -> RGBA8 {
    separable(backdrop, source, opacity, i32::min)
}

pub fn lighten(backdrop: RGBA8, source: RGBA8, opacity: u8) -> RGBA8 {
    separable(backdrop, source, opacity, i32::max)
}

pub fn color_dodge(backdrop: RGBA8, source: RGBA8, opacity: u8) -> RGBA8 {
    separable(backdrop, source, opacity, |b, s| {
        if b == 0 {
            return 0;
        }
        let s = 255 - s;
        if b >= s {
            255
        } else {
            div_un8(b, s)
        }
    })
}

pub fn color_burn(backdrop: RGBA8, source: RGBA8, opacity: u8) -> RGBA8 {
    separable(backdrop, source, opacity, |b, s| {
        if b == 255 {
            return 255;
        }
        let b = 255 - b;
        if b >= s {
            0
        } else {
            255 - div_un8(b, s)
        }
    })
}

pub fn hard_light(backdrop: RGBA8, source: RGBA8, opacity: u8) -> RGBA8 {
    separable(backdrop, source, opacity, hard_light_channel)
}

/// The W3C soft light curve, evaluated in floating point.
pub fn soft_light(backdrop: RGBA8, source: RGBA8, opacity: u8) -> RGBA8 {
    separable(backdrop, source, opacity, |b, s| {
        let b = f64::from(b) / 255.0;
        let s = f64::from(s) / 255.0;
        let d = if b <= 0.25 {
            ((16.0 * b - 12.0) * b + 4.0) * b
        } else {
            b.sqrt()
        };
        let r = if s <= 0.5 {
            b - (1.0 - 2.0 * s) * b * (1.0 - b)
        } else {
            b + (2.0 * s - 1.0) * (d - b)
        };
        (r * 255.0 + 0.5) as i32
    })
}

pub fn difference(backdrop: RGBA8, source: RGBA8, opacity: u8) -> RGBA8 {
    separable(backdrop, source, opacity, |b, s| (b - s).abs())
}

pub fn exclusion(backdrop: RGBA8, source: RGBA8, opacity: u8) -> RGBA8 {
    separable(backdrop, source, opacity, |b, s| b + s - 2 * mul_un8(b, s))
}

pub fn addition(backdrop: RGBA8, source: RGBA8, opacity: u8) -> RGBA8 {
    separable(backdrop, source, opacity, |b, s| (b + s).min(255))
}

/// Source minus backdrop, floored at zero.
pub fn subtract(backdrop: RGBA8, source: RGBA8, opacity: u8) -> RGBA8 {
    separable(backdrop, source, opacity, |b, s| (s - b).max(0))
}

pub fn divide(backdrop: RGBA8, source: RGBA8, opacity: u8) -> RGBA8 {
    separable(backdrop, source, opacity, |b, s| {
        if b == 0 {
            0
        } else if b >= s {
            255
        } else {
            div_un8(b, s)
        }
    })
}

// Non-separable modes, after the PDF blend mode definitions.

type Rgb = [f64; 3];

fn to_unit(c: RGBA8) -> Rgb {
    [
        f64::from(c.r) / 255.0,
        f64::from(c.g) / 255.0,
        f64::from(c.b) / 255.0,
    ]
}

fn from_unit([r, g, b]: Rgb, alpha: u8) -> RGBA8 {
    let channel = |v: f64| ((255.0 * v) as i32).clamp(0, 255) as u8;
    RGBA8::new(channel(r), channel(g), channel(b), alpha)
}

fn lum([r, g, b]: Rgb) -> f64 {
    0.3 * r + 0.59 * g + 0.11 * b
}

fn sat([r, g, b]: Rgb) -> f64 {
    r.max(g).max(b) - r.min(g).min(b)
}

fn clip_color(c: Rgb) -> Rgb {
    let l = lum(c);
    let n = c[0].min(c[1]).min(c[2]);
    let x = c[0].max(c[1]).max(c[2]);
    let mut c = c;
    if n < 0.0 {
        c = c.map(|v| l + (v - l) * l / (l - n));
    }
    if x > 1.0 {
        c = c.map(|v| l + (v - l) * (1.0 - l) / (x - l));
    }
    c
}

fn set_lum(c: Rgb, l: f64) -> Rgb {
    let d = l - lum(c);
    clip_color(c.map(|v| v + d))
}

fn set_sat(c: Rgb, s: f64) -> Rgb {
    let mut order = [0, 1, 2];
    order.sort_by(|&i, &j| c[i].total_cmp(&c[j]));
    let [min, mid, max] = order;

    let mut out = [0.0; 3];
    if c[max] > c[min] {
        out[mid] = (c[mid] - c[min]) * s / (c[max] - c[min]);
        out[max] = s;
    }
    out
}

fn non_separable(backdrop: RGBA8, source: RGBA8, opacity: u8, f: fn(Rgb, Rgb) -> Rgb) -> RGBA8 {
    let mixed = f(to_unit(backdrop), to_unit(source));
    normal(backdrop, from_unit(mixed, source.a), opacity)
}

pub fn hue(backdrop: RGBA8, source: RGBA8, opacity: u8) -> RGBA8 {
    non_separable(backdrop, source, opacity, |b, s| set_lum(set_sat(s, sat(b)), lum(b)))
}

pub fn saturation(backdrop: RGBA8, source: RGBA8, opacity: u8) -> RGBA8 {
    non_separable(backdrop, source, opacity, |b, s| set_lum(set_sat(b, sat(s)), lum(b)))
}

pub fn color(backdrop: RGBA8, source: RGBA8, opacity: u8) -> RGBA8 {
    non_separable(backdrop, source, opacity, |b, s| set_lum(s, lum(b)))
}

pub fn luminosity(backdrop: RGBA8, source: RGBA8, opacity: u8) -> RGBA8 {
    non_separable(backdrop, source, opacity, |b, s| set_lum(b, lum(s)))
}

#[cfg(test)]
mod test {
    use super::*;

    const ALL_MODES: [BlendMode; 19] = [
        BlendMode::Normal,
        BlendMode::Multiply,
        BlendMode::Screen,
        BlendMode::Overlay,
        BlendMode::Darken,
        BlendMode::Lighten,
        BlendMode::ColorDodge,
        BlendMode::ColorBurn,
        BlendMode::HardLight,
        BlendMode::SoftLight,
        BlendMode::Difference,
        BlendMode::Exclusion,
        BlendMode::Hue,
        BlendMode::Saturation,
        BlendMode::Color,
        BlendMode::Luminosity,
        BlendMode::Addition,
        BlendMode::Subtract,
        BlendMode::Divide,
    ];

    fn opaque(r: u8, g: u8, b: u8) -> RGBA8 {
        RGBA8::new(r, g, b, 255)
    }

    #[test]
    fn combine_rounds_like_fixed_point() {
        for x in 0..=255 {
            assert_eq!(combine(255, x), x);
            assert_eq!(combine(x, 255), x);
            assert_eq!(combine(0, x), 0);
        }
        assert_eq!(combine(128, 255), 128);
        assert_eq!(combine(200, 128), 100);
        assert_eq!(combine(128, 128), 64);
    }

    #[test]
    fn transparent_source_keeps_backdrop() {
        let backdrop = RGBA8::new(1, 2, 3, 200);
        let source = RGBA8::new(250, 250, 250, 0);
        for mode in ALL_MODES {
            assert_eq!(blend(mode, backdrop, source, 255), backdrop, "{:?}", mode);
        }
    }

    #[test]
    fn transparent_backdrop_takes_weighted_source() {
        let backdrop = RGBA8::new(90, 90, 90, 0);
        let source = RGBA8::new(10, 20, 30, 200);
        for mode in ALL_MODES {
            assert_eq!(
                blend(mode, backdrop, source, 128),
                RGBA8::new(10, 20, 30, 100),
                "{:?}",
                mode
            );
        }
    }

    #[test]
    fn normal_opaque_source_replaces_backdrop() {
        let source = opaque(200, 100, 50);
        assert_eq!(blend(BlendMode::Normal, opaque(10, 20, 30), source, 255), source);
    }

    #[test]
    fn normal_half_opacity_mixes() {
        let out = blend(BlendMode::Normal, opaque(0, 0, 0), opaque(255, 255, 255), 128);
        assert_eq!(out, opaque(128, 128, 128));
    }

    #[test]
    fn separable_spot_checks() {
        let b = opaque(200, 255, 0);
        let s = opaque(50, 100, 255);
        assert_eq!(multiply(b, s, 255), opaque(39, 100, 0));
        assert_eq!(screen(b, s, 255), opaque(211, 255, 255));
        assert_eq!(darken(b, s, 255), opaque(50, 100, 0));
        assert_eq!(lighten(b, s, 255), opaque(200, 255, 255));
        assert_eq!(difference(b, s, 255), opaque(150, 155, 255));
        assert_eq!(addition(b, s, 255), opaque(250, 255, 255));
        assert_eq!(subtract(b, s, 255), opaque(0, 0, 255));
        assert_eq!(exclusion(opaque(255, 0, 0), opaque(255, 0, 255), 255), opaque(0, 0, 255));
    }

    #[test]
    fn dodge_burn_and_divide_edges() {
        assert_eq!(color_dodge(opaque(0, 10, 10), opaque(9, 255, 0), 255), opaque(0, 255, 10));
        assert_eq!(color_burn(opaque(255, 100, 100), opaque(9, 0, 255), 255), opaque(255, 0, 100));
        assert_eq!(divide(opaque(0, 200, 0), opaque(9, 100, 0), 255), opaque(0, 255, 0));
        // 100 / 200 of full scale
        assert_eq!(divide(opaque(100, 100, 100), opaque(200, 200, 200), 255), opaque(128, 128, 128));
    }

    #[test]
    fn hard_light_and_overlay_swap_roles() {
        let b = opaque(0, 255, 100);
        let s = opaque(255, 0, 100);
        assert_eq!(hard_light(b, s, 255), opaque(255, 0, 78));
        assert_eq!(overlay(b, s, 255), opaque(0, 255, 78));
    }

    #[test]
    fn soft_light_keeps_black_and_white() {
        let out = soft_light(opaque(0, 255, 0), opaque(200, 10, 100), 255);
        assert_eq!(out, opaque(0, 255, 0));
    }

    #[test]
    fn hsl_modes_on_grays_stay_gray() {
        let b = opaque(128, 128, 128);
        let s = opaque(64, 64, 64);
        for f in [hue, saturation, color, luminosity] {
            let out = f(b, s, 255);
            assert_eq!(out.r, out.g);
            assert_eq!(out.g, out.b);
            assert_eq!(out.a, 255);
        }
        assert!(hue(b, s, 255).r.abs_diff(128) <= 1);
        assert!(luminosity(b, s, 255).r.abs_diff(64) <= 1);
    }

    #[test]
    fn color_takes_hue_from_source() {
        let out = color(opaque(128, 128, 128), opaque(255, 0, 0), 255);
        assert!(out.r > out.g);
        assert_eq!(out.g, out.b);
    }
}
