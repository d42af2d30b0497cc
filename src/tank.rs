//! Tank mixing models.
//!
//! Each quality sub-step delivers a tank its accumulated inflow mass and
//! volume plus the volume withdrawn. The mixing model decides how that
//! exchange blends with stored water; the resulting outflow concentration is
//! left in `tank.c`, which the driver copies onto the backing node.

use crate::segment::SegPool;
use crate::types::{MixingModel, Tank};

/// Seeds a tank's internal state from its node's initial concentrations.
/// Parameter overrides are sized by the project before this runs.
pub fn initialize(tank: &mut Tank, pool: &mut SegPool, c0: &[f64], n_species: usize) {
    tank.v = tank.v0;
    tank.c = c0.to_vec();
    if tank.reacted.len() != n_species + 1 {
        tank.reacted = vec![0.0; n_species + 1];
    } else {
        tank.reacted.fill(0.0);
    }
    pool.clear(&mut tank.segs);
    if tank.is_reservoir() {
        return;
    }
    match tank.mix_model {
        MixingModel::Mix1 => {}
        MixingModel::Mix2 => {
            // head = mixing zone, tail = stagnant zone
            let v1 = tank.v0.min(tank.v_mix);
            let v2 = (tank.v0 - tank.v_mix).max(0.0);
            pool.push_tail(&mut tank.segs, v1, c0);
            pool.push_tail(&mut tank.segs, v2, c0);
        }
        MixingModel::Fifo | MixingModel::Lifo => {
            pool.push_tail(&mut tank.segs, tank.v0, c0);
        }
    }
}

/// Applies one sub-step of inflow/outflow exchange.
///
/// `mass_in` is the 1-based per-species mass arriving over the sub-step,
/// `vol_in` the arriving volume and `vol_out` the withdrawn volume, all in
/// internal units.
pub fn mix(
    tank: &mut Tank,
    pool: &mut SegPool,
    mass_in: &[f64],
    vol_in: f64,
    vol_out: f64,
    atol: &[f64],
) {
    if tank.is_reservoir() {
        // infinite source: quality pinned, volume notional
        return;
    }
    match tank.mix_model {
        MixingModel::Mix1 => mix1(tank, mass_in, vol_in, vol_out),
        MixingModel::Mix2 => mix2(tank, pool, mass_in, vol_in, vol_out),
        MixingModel::Fifo => fifo(tank, pool, mass_in, vol_in, vol_out, atol),
        MixingModel::Lifo => lifo(tank, pool, mass_in, vol_in, vol_out, atol),
    }
}

/// Single completely-mixed compartment.
fn mix1(tank: &mut Tank, mass_in: &[f64], vol_in: f64, vol_out: f64) {
    let v_blend = tank.v + vol_in;
    if v_blend > 0.0 && vol_in > 0.0 {
        for m in 1..tank.c.len() {
            tank.c[m] = (tank.c[m] * tank.v + mass_in[m]) / v_blend;
        }
    }
    tank.v = (tank.v + vol_in - vol_out).max(0.0);
}

/// Two-compartment model: a mixing zone capped at `v_mix` exchanging with a
/// stagnant remainder.
fn mix2(tank: &mut Tank, pool: &mut SegPool, mass_in: &[f64], vol_in: f64, vol_out: f64) {
    let zone1 = tank.segs.head;
    let zone2 = tank.segs.tail;
    if zone1 == crate::segment::NIL || zone1 == zone2 {
        return;
    }

    // inflow blends into the mixing zone, outflow leaves from it
    let (mut v1, mut v2) = (pool.seg(zone1).v, pool.seg(zone2).v);
    if vol_in > 0.0 {
        let blend = v1 + vol_in;
        for m in 1..tank.c.len() {
            let c = (pool.seg(zone1).c[m] * v1 + mass_in[m]) / blend;
            pool.seg_mut(zone1).c[m] = c;
        }
        v1 = blend;
    }
    v1 -= vol_out;

    if v1 > tank.v_mix {
        // overflow pushes mixed water into the stagnant zone
        let vt = v1 - tank.v_mix;
        let blend = v2 + vt;
        if blend > 0.0 {
            for m in 1..tank.c.len() {
                let c =
                    (pool.seg(zone2).c[m] * v2 + pool.seg(zone1).c[m] * vt) / blend;
                pool.seg_mut(zone2).c[m] = c;
            }
        }
        v2 = blend;
        v1 = tank.v_mix;
    } else if v1 < tank.v_mix && v2 > 0.0 {
        // underflow drains stagnant water back into the mixing zone
        let vt = (tank.v_mix - v1).min(v2);
        let blend = v1 + vt;
        if blend > 0.0 {
            for m in 1..tank.c.len() {
                let c =
                    (pool.seg(zone1).c[m] * v1 + pool.seg(zone2).c[m] * vt) / blend;
                pool.seg_mut(zone1).c[m] = c;
            }
        }
        v1 = blend;
        v2 -= vt;
    }

    pool.seg_mut(zone1).v = v1.max(0.0);
    pool.seg_mut(zone2).v = v2.max(0.0);
    tank.v = (tank.v + vol_in - vol_out).max(0.0);
    for m in 1..tank.c.len() {
        tank.c[m] = pool.seg(zone1).c[m];
    }
}

/// Plug flow: inflow pushes at the upstream end, outflow pulls from the
/// downstream end in arrival order.
fn fifo(
    tank: &mut Tank,
    pool: &mut SegPool,
    mass_in: &[f64],
    vol_in: f64,
    vol_out: f64,
    atol: &[f64],
) {
    let ns = tank.c.len() - 1;
    if vol_in > 0.0 {
        let mut cin = vec![0.0; ns + 1];
        for m in 1..=ns {
            cin[m] = mass_in[m] / vol_in;
        }
        pool.push_tail(&mut tank.segs, vol_in, &cin);
    }
    withdraw_from_head(tank, pool, vol_out);
    pool.coalesce(&mut tank.segs, atol, 1e-8);
    tank.v = (tank.v + vol_in - vol_out).max(0.0);
}

/// Stacked storage: inflow and outflow share the same end.
fn lifo(
    tank: &mut Tank,
    pool: &mut SegPool,
    mass_in: &[f64],
    vol_in: f64,
    vol_out: f64,
    atol: &[f64],
) {
    let ns = tank.c.len() - 1;
    let vnet = vol_in - vol_out;
    if vol_in > 0.0 {
        let mut cin = vec![0.0; ns + 1];
        for m in 1..=ns {
            cin[m] = mass_in[m] / vol_in;
        }
        if vnet >= 0.0 {
            // net filling: the stack grows and the outflow passes through at
            // the inflow quality
            if vnet > 0.0 {
                pool.push_head(&mut tank.segs, vnet, &cin);
            }
            for m in 1..=ns {
                tank.c[m] = cin[m];
            }
        } else {
            // net draining: inflow re-emerges first, then stored water
            pool.push_head(&mut tank.segs, vol_in, &cin);
            withdraw_from_head(tank, pool, vol_out);
        }
    } else if vol_out > 0.0 {
        withdraw_from_head(tank, pool, vol_out);
    }
    pool.coalesce(&mut tank.segs, atol, 1e-8);
    tank.v = (tank.v + vnet).max(0.0);
}

/// Pulls `vol_out` from the head of the tank's chain and leaves the
/// volume-weighted concentration of the withdrawn water in `tank.c`.
fn withdraw_from_head(tank: &mut Tank, pool: &mut SegPool, vol_out: f64) {
    let ns = tank.c.len() - 1;
    if vol_out <= 0.0 {
        if let Some(head) = pool.iter(&tank.segs).next() {
            for m in 1..=ns {
                tank.c[m] = pool.seg(head).c[m];
            }
        }
        return;
    }
    let mut remaining = vol_out;
    let mut mass = vec![0.0; ns + 1];
    let mut taken = 0.0;
    while remaining > 0.0 {
        let Some(head) = pool.iter(&tank.segs).next() else { break };
        let v = pool.seg(head).v;
        if v <= remaining {
            for m in 1..=ns {
                mass[m] += pool.seg(head).c[m] * v;
            }
            taken += v;
            remaining -= v;
            let popped = pool.pop_head(&mut tank.segs).expect("head exists");
            pool.free_seg(popped);
        } else {
            for m in 1..=ns {
                mass[m] += pool.seg(head).c[m] * remaining;
            }
            taken += remaining;
            pool.seg_mut(head).v = v - remaining;
            remaining = 0.0;
        }
    }
    if taken > 0.0 {
        for m in 1..=ns {
            tank.c[m] = mass[m] / taken;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tank_with(model: MixingModel, v0: f64, v_mix: f64, c0: f64) -> (Tank, SegPool) {
        let mut tank = Tank::new(1, 100.0, v0, model, v_mix);
        let mut pool = SegPool::new(1);
        initialize(&mut tank, &mut pool, &[0.0, c0], 1);
        (tank, pool)
    }

    #[test]
    fn mix1_blends_toward_inflow() {
        let (mut tank, mut pool) = tank_with(MixingModel::Mix1, 1000.0, 0.0, 0.0);
        // 100 volume units arriving at c=1, 100 leaving
        mix(&mut tank, &mut pool, &[0.0, 100.0], 100.0, 100.0, &[0.0, 1e-6]);
        assert!((tank.c[1] - 100.0 / 1100.0).abs() < 1e-12);
        assert_eq!(tank.v, 1000.0);
    }

    #[test]
    fn mix2_caps_the_mixing_zone() {
        let (mut tank, mut pool) = tank_with(MixingModel::Mix2, 1000.0, 400.0, 0.0);
        // pure filling pushes overflow into the stagnant zone
        mix(&mut tank, &mut pool, &[0.0, 50.0], 50.0, 0.0, &[0.0, 1e-6]);
        let v1 = pool.seg(tank.segs.head).v;
        assert!((v1 - 400.0).abs() < 1e-9);
        assert!((tank.v - 1050.0).abs() < 1e-9);
        // total stored mass equals what came in
        let v2 = pool.seg(tank.segs.tail).v;
        let stored = pool.seg(tank.segs.head).c[1] * v1 + pool.seg(tank.segs.tail).c[1] * v2;
        assert!((stored - 50.0).abs() < 1e-9);
    }

    #[test]
    fn fifo_releases_pulses_in_arrival_order() {
        let (mut tank, mut pool) = tank_with(MixingModel::Fifo, 100.0, 0.0, 0.0);
        // two distinct pulses in, no outflow yet
        mix(&mut tank, &mut pool, &[0.0, 50.0], 50.0, 0.0, &[0.0, 1e-9]);
        mix(&mut tank, &mut pool, &[0.0, 0.0], 50.0, 0.0, &[0.0, 1e-9]);

        // drain the original stored water first
        mix(&mut tank, &mut pool, &[0.0, 0.0], 0.0, 100.0, &[0.0, 1e-9]);
        assert!((tank.c[1] - 0.0).abs() < 1e-12);
        // next out is the first pulse
        mix(&mut tank, &mut pool, &[0.0, 0.0], 0.0, 50.0, &[0.0, 1e-9]);
        assert!((tank.c[1] - 1.0).abs() < 1e-12);
        // then the second
        mix(&mut tank, &mut pool, &[0.0, 0.0], 0.0, 50.0, &[0.0, 1e-9]);
        assert!((tank.c[1] - 0.0).abs() < 1e-12);
    }

    #[test]
    fn lifo_returns_the_last_pulse_first() {
        let (mut tank, mut pool) = tank_with(MixingModel::Lifo, 100.0, 0.0, 0.0);
        mix(&mut tank, &mut pool, &[0.0, 50.0], 50.0, 0.0, &[0.0, 1e-9]);
        // draining now returns the pulse that just went in
        mix(&mut tank, &mut pool, &[0.0, 0.0], 0.0, 50.0, &[0.0, 1e-9]);
        assert!((tank.c[1] - 1.0).abs() < 1e-12);
        // further draining reaches the original stored water
        mix(&mut tank, &mut pool, &[0.0, 0.0], 0.0, 50.0, &[0.0, 1e-9]);
        assert!((tank.c[1] - 0.0).abs() < 1e-12);
    }

    #[test]
    fn reservoir_holds_its_quality() {
        let mut tank = Tank::new(1, 0.0, 0.0, MixingModel::Mix1, 0.0);
        let mut pool = SegPool::new(1);
        initialize(&mut tank, &mut pool, &[0.0, 2.5], 1);
        mix(&mut tank, &mut pool, &[0.0, 100.0], 100.0, 100.0, &[0.0, 1e-6]);
        assert_eq!(tank.c[1], 2.5);
    }
}
