//! Simulation statistics collection and reporting.
//!
//! This module tracks the performance counters of the simulated machine. It provides:
//! 1. **Per-Core Counters:** `CoreStats`, accumulated by each engine and merged with
//!    the counters of the miss helpers it launched.
//! 2. **Machine Totals:** `SimStats`, total cycles from the clock and the per-core breakdown.
//! 3. **Reporting:** Sectioned text output in the format of the final report.

use serde::Serialize;

use crate::common::constants::CORE_COUNT;

/// Counters of one core, including the helpers it launched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CoreStats {
    /// Instructions that committed on this core or in one of its helpers.
    pub instructions_retired: u64,
    /// Cycles the core engine ticked, whether or not a context was running.
    pub cycles: u64,
    /// Cycles spent waiting on the context queue lock.
    pub stall_cycles: u64,
    /// Instruction cache hits.
    pub icache_hits: u64,
    /// Instruction cache misses.
    pub icache_misses: u64,
    /// Data cache hits, counting stores to `Modified` lines.
    pub dcache_hits: u64,
    /// Data cache misses, counting upgrades of `Shared` lines.
    pub dcache_misses: u64,
    /// Blocks written back from this core's data cache.
    pub write_backs: u64,
    /// Lines of this core's data cache invalidated by the peer.
    pub invalidations: u64,
    /// Contexts installed after the first.
    pub context_switches: u64,
    /// Miss helpers launched.
    pub helper_launches: u64,
    /// Contexts that executed `FIN` on this core.
    pub contexts_retired: u64,
}

impl CoreStats {
    /// Adds the event counters of `other`, typically a finished helper.
    ///
    /// Cycle counts are not added: a helper runs in the same cycles as its core.
    pub fn merge(&mut self, other: &Self) {
        self.instructions_retired += other.instructions_retired;
        self.stall_cycles += other.stall_cycles;
        self.icache_hits += other.icache_hits;
        self.icache_misses += other.icache_misses;
        self.dcache_hits += other.dcache_hits;
        self.dcache_misses += other.dcache_misses;
        self.context_switches += other.context_switches;
        self.helper_launches += other.helper_launches;
        self.contexts_retired += other.contexts_retired;
    }

    /// Instructions retired per engine cycle.
    pub fn ipc(&self) -> f64 {
        self.instructions_retired as f64 / self.cycles.max(1) as f64
    }
}

/// Simulation statistics of the whole machine.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SimStats {
    /// Completed simulated cycles.
    pub cycles: u64,
    /// Wall-clock duration of the run.
    pub host_seconds: f64,
    /// Counters per core, in core order.
    pub cores: Vec<CoreStats>,
}

impl SimStats {
    /// Creates the totals for `cycles` with one zeroed entry per core.
    pub fn new(cycles: u64) -> Self {
        Self {
            cycles,
            host_seconds: 0.0,
            cores: vec![CoreStats::default(); CORE_COUNT],
        }
    }

    /// Sum of instructions retired by both cores.
    pub fn instructions_retired(&self) -> u64 {
        self.cores.iter().map(|c| c.instructions_retired).sum()
    }

    /// Prints only the requested sections of statistics to stdout.
    ///
    /// # Arguments
    ///
    /// * `sections` - Section names to print: `summary`, `core`, `memory`,
    ///   `scheduling`. An empty slice prints everything.
    pub fn print_sections(&self, sections: &[String]) {
        let want = |s: &str| sections.is_empty() || sections.iter().any(|x| x == s);
        let cyc = self.cycles.max(1);
        let instr = self.instructions_retired();

        if want("summary") {
            let seconds = self.host_seconds.max(f64::EPSILON);
            println!("\n==========================================================");
            println!("SMP SIMULATION STATISTICS");
            println!("==========================================================");
            println!("host_seconds             {:.4} s", self.host_seconds);
            println!("sim_cycles               {}", self.cycles);
            println!("sim_freq                 {:.2} kHz", (self.cycles as f64 / seconds) / 1000.0);
            println!("sim_insts                {instr}");
            println!("sim_ipc                  {:.4}", instr as f64 / cyc as f64);
            println!("----------------------------------------------------------");
        }
        if want("core") {
            println!("CORE BREAKDOWN");
            for (id, core) in self.cores.iter().enumerate() {
                println!("  core{id}.insts            {}", core.instructions_retired);
                println!("  core{id}.cycles           {}", core.cycles);
                println!("  core{id}.ipc              {:.4}", core.ipc());
                println!(
                    "  core{id}.stalls.queue     {} ({:.2}%)",
                    core.stall_cycles,
                    (core.stall_cycles as f64 / cyc as f64) * 100.0
                );
            }
            println!("----------------------------------------------------------");
        }
        if want("memory") {
            let print_cache = |name: &str, hits: u64, misses: u64| {
                let total = hits + misses;
                let miss_rate = if total > 0 {
                    (misses as f64 / total as f64) * 100.0
                } else {
                    0.0
                };
                println!(
                    "  {name:<8} accesses: {total:<10} | hits: {hits:<10} | miss_rate: {miss_rate:.2}%"
                );
            };
            println!("MEMORY HIERARCHY");
            for (id, core) in self.cores.iter().enumerate() {
                print_cache(&format!("L1-I{id}"), core.icache_hits, core.icache_misses);
                print_cache(&format!("L1-D{id}"), core.dcache_hits, core.dcache_misses);
                println!(
                    "  L1-D{id}    write_backs: {:<7} | invalidations: {}",
                    core.write_backs, core.invalidations
                );
            }
            println!("----------------------------------------------------------");
        }
        if want("scheduling") {
            println!("SCHEDULING");
            for (id, core) in self.cores.iter().enumerate() {
                println!("  core{id}.retired          {}", core.contexts_retired);
                println!("  core{id}.switches         {}", core.context_switches);
                println!("  core{id}.helpers          {}", core.helper_launches);
            }
        }
        println!("==========================================================");
    }

    /// Prints all statistics sections to stdout.
    ///
    /// Equivalent to `print_sections(&[])`.
    pub fn print(&self) {
        self.print_sections(&[]);
    }
}
