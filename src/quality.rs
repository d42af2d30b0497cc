//! Water quality transport driver.
//!
//! One engine instance lives from quality-open to close. Each step reads the
//! hydraulic period in effect, orders nodes by flow, advances Lagrangian
//! transport in sub-steps bounded by the shortest pipe residence time, fires
//! sources, runs the reaction kernels and samples reported output.

use tracing::{debug, info, warn};

use crate::chemistry::{Chemistry, HydVars};
use crate::hydraulics::Hydraulics;
use crate::msx_error::{MsxError, Result};
use crate::output::{OutHeader, OutWriter};
use crate::project::{Project, LPERFT3};
use crate::segment::{SegPool, NIL};
use crate::tank;
use crate::types::{ExprClass, ObjectScope, SourceKind};

/// Smallest permitted segment volume, before the per-sub-step rule.
const MIN_SEG_VOLUME: f64 = 1.0e-8;

/// Runtime state of the quality solver.
#[derive(Debug)]
pub struct QualityEngine {
    pool: SegPool,
    chemistry: Chemistry,
    /// Per-node inflow volume accumulated over a sub-step.
    vol_in: Vec<f64>,
    /// Per-node inflow mass per species accumulated over a sub-step.
    mass_in: Vec<Vec<f64>>,
    /// Node processing order for the current hydraulic period.
    order: Vec<usize>,
    /// 1-based absolute tolerance per species, for segment merging.
    atol: Vec<f64>,
    /// Longest sub-step that moves at most one pipe volume, seconds.
    dtmax: f64,
    hyd_applied: bool,
    initialized: bool,
}

impl QualityEngine {
    /// Allocates the segment pool, accumulators and integrator workspaces.
    pub fn open(project: &Project) -> QualityEngine {
        let ns = project.n_species();
        let n_nodes = project.nodes.len();
        info!(
            species = ns,
            nodes = n_nodes - 1,
            links = project.links.len() - 1,
            "quality solver opened"
        );
        QualityEngine {
            pool: SegPool::new(ns),
            chemistry: Chemistry::open(project),
            vol_in: vec![0.0; n_nodes],
            mass_in: vec![vec![0.0; ns + 1]; n_nodes],
            order: (1..n_nodes).collect(),
            atol: std::iter::once(0.0)
                .chain(project.species.iter().skip(1).map(|s| s.atol))
                .collect(),
            dtmax: f64::MAX,
            hyd_applied: false,
            initialized: false,
        }
    }

    /// Seeds segments and concentrations and zeroes every clock and total.
    pub fn init(&mut self, project: &mut Project) {
        let ns = project.n_species();
        project.sync_param_defaults();
        for node in project.nodes.iter_mut().skip(1) {
            node.c0.resize(ns + 1, 0.0);
            node.c = node.c0.clone();
        }
        for link in project.links.iter_mut().skip(1) {
            link.c0.resize(ns + 1, 0.0);
            link.reacted = vec![0.0; ns + 1];
            link.flow = 0.0;
            link.flow_reversed = false;
            self.pool.clear(&mut link.segs);
            let volume = link.volume();
            if volume > 0.0 {
                self.pool.push_tail(&mut link.segs, volume, &link.c0);
            }
        }
        for i in 1..project.tanks.len() {
            let node = project.tanks[i].node;
            let c0 = project.nodes[node].c0.clone();
            tank::initialize(&mut project.tanks[i], &mut self.pool, &c0, ns);
            project.nodes[node].c = project.tanks[i].c.clone();
        }
        self.chemistry.reload_constants(project);
        project.times.qtime = 0;
        project.times.htime = 0;
        project.times.rtime = project.times.rstart;
        self.hyd_applied = false;
        self.initialized = true;
        info!("quality solver initialized");
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Forces the next step to re-read flows, residence times and node order.
    pub fn invalidate_hydraulics(&mut self) {
        self.hyd_applied = false;
    }

    /// Advances one quality step. Returns the new quality time and the time
    /// remaining until the duration is reached.
    pub fn step(
        &mut self,
        project: &mut Project,
        hydraulics: &mut Hydraulics,
        out: &mut OutWriter,
    ) -> Result<(u64, u64)> {
        let dur = project.times.dur;
        if project.times.qtime >= dur {
            return Ok((project.times.qtime, 0));
        }
        let t_end = (project.times.qtime + project.times.qstep).min(dur);

        while project.times.qtime < t_end {
            let moved = hydraulics.advance(project.times.qtime);
            if moved || !self.hyd_applied {
                self.apply_hydraulics(project, hydraulics)?;
            }
            let boundary = hydraulics
                .next_event(project.times.qtime, dur)
                .min(t_end)
                .max(project.times.qtime + 1);
            let span = (boundary - project.times.qtime) as f64;
            let mut elapsed = 0.0;
            while elapsed < span {
                let dt = (span - elapsed).min(self.dtmax);
                let t_now = project.times.qtime as f64 + elapsed;
                self.transport(project, hydraulics, dt, t_now)?;
                elapsed += dt;
            }
            project.times.qtime = boundary;
            project.times.htime = hydraulics.current()?.time;
        }

        while project.times.rtime <= project.times.qtime && project.times.rtime <= dur {
            self.report(project, out)?;
            if project.times.rstep == 0 {
                break;
            }
            project.times.rtime += project.times.rstep;
        }
        debug!(t = project.times.qtime, "quality step complete");

        Ok((project.times.qtime, dur - project.times.qtime))
    }

    /// Copies the current hydraulic record onto the links, reverses segment
    /// chains where the flow changed sign, recomputes the residence bound and
    /// re-sorts the nodes.
    fn apply_hydraulics(
        &mut self,
        project: &mut Project,
        hydraulics: &Hydraulics,
    ) -> Result<()> {
        let record = hydraulics.current()?;
        if record.flows.len() != project.links.len() || record.demands.len() != project.nodes.len()
        {
            return Err(MsxError::HydraulicsRead);
        }
        self.dtmax = f64::MAX;
        for (k, link) in project.links.iter_mut().enumerate().skip(1) {
            let flow = record.flows[k];
            if flow * link.flow < 0.0 {
                self.pool.reverse(&mut link.segs);
            }
            link.flow = flow;
            link.flow_reversed = flow < 0.0;
            let volume = link.volume();
            if flow.abs() > 0.0 && volume > 0.0 {
                self.dtmax = self.dtmax.min(volume / flow.abs());
            }
        }
        if self.dtmax == f64::MAX {
            // stagnant network: one sub-step per hydraulic window
            self.dtmax = project.times.qstep.max(1) as f64;
        }
        self.sort_nodes(project);
        self.hyd_applied = true;
        debug!(dtmax = self.dtmax, "hydraulic period applied");
        Ok(())
    }

    /// Orders nodes so every node follows the upstream ends of its inflow
    /// pipes. Cycles fall back to index order with a bounded revisit budget.
    fn sort_nodes(&mut self, project: &Project) {
        let n = project.nodes.len();
        let mut indegree = vec![0usize; n];
        for link in project.links.iter().skip(1) {
            if link.flow.abs() > 0.0 {
                indegree[link.down_node()] += 1;
            }
        }
        self.order.clear();
        let mut queue: std::collections::VecDeque<usize> =
            (1..n).filter(|&j| indegree[j] == 0).collect();
        let mut visits = 0usize;
        let budget = 2 * n;
        let mut done = vec![false; n];
        while let Some(j) = queue.pop_front() {
            if done[j] {
                continue;
            }
            done[j] = true;
            self.order.push(j);
            for entry in project.adj[j].iter() {
                let link = &project.links[entry.link];
                if link.flow.abs() > 0.0 && link.up_node() == j {
                    let down = link.down_node();
                    if !done[down] {
                        indegree[down] = indegree[down].saturating_sub(1);
                        if indegree[down] == 0 {
                            queue.push_back(down);
                        }
                    }
                }
            }
            visits += 1;
            if visits > budget {
                break;
            }
        }
        // nodes on cycles (tank loops) keep declaration order
        for j in 1..n {
            if !done[j] {
                self.order.push(j);
            }
        }
    }

    /// One transport sub-step of length `dt` seconds starting at `t_now`.
    fn transport(
        &mut self,
        project: &mut Project,
        hydraulics: &Hydraulics,
        dt: f64,
        t_now: f64,
    ) -> Result<()> {
        let ns = project.n_species();
        let record = hydraulics.current()?;

        // phase 1: eject segments into downstream node accumulators
        for j in 1..project.nodes.len() {
            self.vol_in[j] = 0.0;
            self.mass_in[j].fill(0.0);
        }
        for link in project.links.iter_mut().skip(1) {
            let q = link.flow.abs();
            if q == 0.0 {
                continue;
            }
            let mut vtrans = q * dt;
            let down = link.down_node();
            self.vol_in[down] += vtrans;
            while vtrans > 0.0 {
                let head = link.segs.head;
                if head == NIL {
                    break;
                }
                let v = self.pool.seg(head).v;
                if v <= vtrans {
                    for m in 1..=ns {
                        self.mass_in[down][m] += self.pool.seg(head).c[m] * v;
                    }
                    vtrans -= v;
                    let popped = self.pool.pop_head(&mut link.segs).expect("head exists");
                    self.pool.free_seg(popped);
                } else {
                    for m in 1..=ns {
                        self.mass_in[down][m] += self.pool.seg(head).c[m] * vtrans;
                    }
                    self.pool.seg_mut(head).v = v - vtrans;
                    vtrans = 0.0;
                }
            }
        }

        // phase 2: blend junction inflows and mix tanks, upstream first
        for idx in 0..self.order.len() {
            let j = self.order[idx];
            let demand = record.demands[j];
            let tank_index = project.nodes[j].tank;
            if tank_index == 0 {
                // external inflow enters at zero concentration unless a
                // CONCEN source overrides it below
                let v_ext = (-demand).max(0.0) * dt;
                let v_total = self.vol_in[j] + v_ext;
                if v_total > 0.0 {
                    for m in 1..=ns {
                        project.nodes[j].c[m] = self.mass_in[j][m] / v_total;
                    }
                }
            } else {
                let vol_out = self.outflow_volume(project, j, demand, dt);
                let tk = &mut project.tanks[tank_index];
                tank::mix(
                    tk,
                    &mut self.pool,
                    &self.mass_in[j],
                    self.vol_in[j],
                    vol_out,
                    &self.atol,
                );
                if tk.is_reservoir() {
                    let c0 = project.nodes[j].c0.clone();
                    project.nodes[j].c = c0;
                } else {
                    project.nodes[j].c = tk.c.clone();
                }
            }
        }

        // phase 3: sources adjust outflow concentrations
        self.apply_sources(project, record, dt, t_now)?;

        // phase 4: release node outflow into the upstream end of each pipe
        for k in 1..project.links.len() {
            let q = project.links[k].flow.abs();
            if q == 0.0 {
                continue;
            }
            let vtrans = q * dt;
            let up = project.links[k].up_node();
            let c_up = project.nodes[up].c.clone();
            let link = &mut project.links[k];
            self.pool.push_tail(&mut link.segs, vtrans, &c_up);
            let min_vol = MIN_SEG_VOLUME.max(vtrans * 1.0e-3);
            self.pool.coalesce(&mut link.segs, &self.atol, min_vol);
        }

        // phase 5: reactions
        self.react(project, dt, t_now)?;
        Ok(())
    }

    /// Total volume leaving a tank node over `dt`: outflowing links plus
    /// consumer demand.
    fn outflow_volume(&self, project: &Project, j: usize, demand: f64, dt: f64) -> f64 {
        let mut q_out = demand.max(0.0);
        for entry in project.adj[j].iter() {
            let link = &project.links[entry.link];
            if link.flow.abs() > 0.0 && link.up_node() == j {
                q_out += link.flow.abs();
            }
        }
        q_out * dt
    }

    fn apply_sources(
        &mut self,
        project: &mut Project,
        record: &crate::hydraulics::HydRecord,
        dt: f64,
        t_now: f64,
    ) -> Result<()> {
        let t_pat = t_now as u64;
        let (pstart, pstep) = (project.times.pstart, project.times.pstep);
        for j in 1..project.nodes.len() {
            if project.nodes[j].sources.is_empty() {
                continue;
            }
            let demand = record.demands[j];
            let v_ext = (-demand).max(0.0) * dt;
            let v_total = self.vol_in[j] + v_ext;
            let is_tank = project.nodes[j].tank != 0;
            let releases = if is_tank {
                self.outflow_volume(project, j, demand, dt) > 0.0
            } else {
                v_ext > 0.0
            };
            let sources = project.nodes[j].sources.clone();
            for source in sources.iter() {
                let m = source.species;
                let mult = if source.pattern != 0 {
                    project.patterns[source.pattern].value_at(t_pat, pstart, pstep)
                } else {
                    1.0
                };
                let strength = source.strength * mult;
                let c = &mut project.nodes[j].c;
                match source.kind {
                    SourceKind::NoSource => {}
                    SourceKind::Concen => {
                        if releases {
                            c[m] = strength;
                        }
                    }
                    SourceKind::Mass => {
                        // strength is a mass rate per second; dilute into the
                        // total inflow through the node
                        let q_in = v_total / dt * LPERFT3;
                        if q_in > 0.0 {
                            c[m] += strength / q_in;
                        }
                    }
                    SourceKind::Setpoint => {
                        c[m] = c[m].max(strength);
                    }
                    SourceKind::FlowPaced => {
                        c[m] += strength;
                    }
                }
            }
        }
        Ok(())
    }

    /// Runs the reaction kernels over every pipe segment and tank volume.
    fn react(&mut self, project: &mut Project, dt: f64, t_now: f64) -> Result<()> {
        let pipes_react = self.chemistry.reacts(ExprClass::Pipe);
        let tanks_react = self.chemistry.reacts(ExprClass::Tank);
        if !pipes_react && !tanks_react {
            return Ok(());
        }
        let area_ucf = project.units.area;

        if pipes_react {
            for k in 1..project.links.len() {
                let link = &project.links[k];
                let hyd = HydVars::for_link(
                    link.flow,
                    link.len,
                    link.diam,
                    link.roughness,
                    area_ucf,
                    t_now,
                );
                let params = project.links[k].param.clone();
                let mut reacted = std::mem::take(&mut project.links[k].reacted);
                let segs: Vec<usize> = self.pool.iter(&project.links[k].segs).collect();
                for i in segs {
                    let volume = self.pool.seg(i).v;
                    let mut conc = std::mem::take(&mut self.pool.seg_mut(i).c);
                    let result = self.chemistry.react(
                        project,
                        ExprClass::Pipe,
                        &mut conc,
                        &params,
                        &hyd,
                        dt,
                        volume,
                        &mut reacted,
                    );
                    self.pool.seg_mut(i).c = conc;
                    result?;
                }
                project.links[k].reacted = reacted;
            }
        }

        if tanks_react {
            for i in 1..project.tanks.len() {
                if project.tanks[i].is_reservoir() {
                    continue;
                }
                let hyd = HydVars::for_tank(t_now);
                let params = project.tanks[i].param.clone();
                let mut reacted = std::mem::take(&mut project.tanks[i].reacted);
                match project.tanks[i].mix_model {
                    crate::types::MixingModel::Mix1 => {
                        let volume = project.tanks[i].v;
                        let mut conc = std::mem::take(&mut project.tanks[i].c);
                        let result = self.chemistry.react(
                            project,
                            ExprClass::Tank,
                            &mut conc,
                            &params,
                            &hyd,
                            dt,
                            volume,
                            &mut reacted,
                        );
                        project.tanks[i].c = conc;
                        result?;
                    }
                    _ => {
                        let segs: Vec<usize> =
                            self.pool.iter(&project.tanks[i].segs).collect();
                        for s in segs {
                            let volume = self.pool.seg(s).v;
                            if volume <= 0.0 {
                                continue;
                            }
                            let mut conc = std::mem::take(&mut self.pool.seg_mut(s).c);
                            let result = self.chemistry.react(
                                project,
                                ExprClass::Tank,
                                &mut conc,
                                &params,
                                &hyd,
                                dt,
                                volume,
                                &mut reacted,
                            );
                            self.pool.seg_mut(s).c = conc;
                            result?;
                        }
                        // the mixing zone is the chain head
                        let head = project.tanks[i].segs.head;
                        if head != NIL {
                            for m in 1..project.tanks[i].c.len() {
                                project.tanks[i].c[m] = self.pool.seg(head).c[m];
                            }
                        }
                    }
                }
                project.tanks[i].reacted = reacted;
                let node = project.tanks[i].node;
                project.nodes[node].c = project.tanks[i].c.clone();
            }
        }
        Ok(())
    }

    /// Volume-weighted concentration of species `m` across a link's chain.
    pub fn link_quality(&self, project: &Project, k: usize, m: usize) -> f64 {
        let link = &project.links[k];
        let mut mass = 0.0;
        let mut volume = 0.0;
        for i in self.pool.iter(&link.segs) {
            mass += self.pool.seg(i).c[m] * self.pool.seg(i).v;
            volume += self.pool.seg(i).v;
        }
        if volume > 0.0 {
            mass / volume
        } else {
            link.c0[m]
        }
    }

    /// Samples every reported node and link into the binary stream.
    fn report(&mut self, project: &Project, out: &mut OutWriter) -> Result<()> {
        let ns = project.n_species();
        let n_report_nodes = project.nodes.iter().skip(1).filter(|n| n.report).count();
        let n_report_links = project.links.iter().skip(1).filter(|l| l.report).count();
        if n_report_nodes + n_report_links == 0 {
            return Ok(());
        }
        let header = OutHeader {
            n_species: ns as u32,
            n_report_nodes: n_report_nodes as u32,
            n_report_links: n_report_links as u32,
        };
        let mut values = Vec::with_capacity((n_report_nodes + n_report_links) * ns);
        for node in project.nodes.iter().skip(1).filter(|n| n.report) {
            for m in 1..=ns {
                values.push(node.c[m] as f32);
            }
        }
        for (k, link) in project.links.iter().enumerate().skip(1) {
            if link.report {
                for m in 1..=ns {
                    values.push(self.link_quality(project, k, m) as f32);
                }
            }
        }
        out.write_period(header, &values)
    }

    /// Quality of one species at one location, for polling between steps.
    pub fn quality(
        &self,
        project: &Project,
        scope: ObjectScope,
        index: usize,
        species: usize,
    ) -> Result<f64> {
        if species == 0 || species > project.n_species() {
            return Err(MsxError::InvalidObjectIndex);
        }
        match scope {
            ObjectScope::Node => {
                if index == 0 || index >= project.nodes.len() {
                    return Err(MsxError::InvalidObjectIndex);
                }
                Ok(project.nodes[index].c[species])
            }
            ObjectScope::Link => {
                if index == 0 || index >= project.links.len() {
                    return Err(MsxError::InvalidObjectIndex);
                }
                Ok(self.link_quality(project, index, species))
            }
        }
    }

    /// Checks the per-pipe segment-volume invariant; used by tests and
    /// debug assertions.
    pub fn segment_volumes_consistent(&self, project: &Project) -> bool {
        for link in project.links.iter().skip(1) {
            let total = self.pool.total_volume(&link.segs);
            let expect = link.volume();
            if (total - expect).abs() > 1e-6 * expect.max(1.0) {
                warn!(link = %link.id, total, expect, "segment volume drift");
                return false;
            }
        }
        true
    }

    /// Releases every segment chain.
    pub fn close(&mut self, project: &mut Project) {
        for link in project.links.iter_mut().skip(1) {
            self.pool.clear(&mut link.segs);
        }
        for tank in project.tanks.iter_mut().skip(1) {
            self.pool.clear(&mut tank.segs);
        }
        self.initialized = false;
    }
}
