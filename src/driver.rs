// MIT License - Copyright (c) 2026 Peter Wright
// Alarm control core

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::devices::output::{OutputDefinition, OutputKind, OutputValue, OutputWrite};
use crate::mode::ControlMode;

/// Inputs that decide every output's target value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputContext {
    pub mode: ControlMode,
    pub outputs_active: bool,
    pub silenced: bool,
    /// Current phase of a running chirp (on half-cycle).
    pub chirp_on: bool,
}

/// Maps the control state to concrete output values.
///
/// | Condition                                  | Value      |
/// |--------------------------------------------|------------|
/// | `alarm_pre`                                | active     |
/// | `alarm_full` with outputs active           | active     |
/// | the above, siren, silenced                 | inactive   |
/// | chirp output during an on half-cycle       | active     |
/// | anything else                              | inactive   |
#[derive(Debug, Default)]
pub struct OutputDriver {
    outputs: Vec<OutputDefinition>,
    applied: BTreeMap<String, OutputValue>,
}

impl OutputDriver {
    /// Register outputs in order. A repeated identifier replaces the
    /// earlier definition in place.
    pub fn new(defs: Vec<OutputDefinition>) -> Self {
        let mut outputs: Vec<OutputDefinition> = Vec::with_capacity(defs.len());
        for def in defs {
            if let Some(existing) = outputs.iter_mut().find(|o| o.id == def.id) {
                warn!("Duplicate output id {}; last registration wins", def.id);
                *existing = def;
            } else {
                outputs.push(def);
            }
        }
        Self {
            outputs,
            applied: BTreeMap::new(),
        }
    }

    pub fn outputs(&self) -> &[OutputDefinition] {
        &self.outputs
    }

    pub fn has_chirp_outputs(&self) -> bool {
        self.outputs.iter().any(|o| o.chirp)
    }

    /// Target value of one output under `ctx`.
    pub fn target(def: &OutputDefinition, ctx: &OutputContext) -> OutputValue {
        let alarm_on = match ctx.mode {
            ControlMode::AlarmPre => true,
            ControlMode::AlarmFull => ctx.outputs_active,
            _ => false,
        };
        let active = if alarm_on {
            !(def.kind == OutputKind::Siren && ctx.silenced)
        } else {
            def.chirp && ctx.chirp_on
        };
        if active {
            def.active_value.clone()
        } else {
            def.inactive_value.clone()
        }
    }

    /// Recompute all outputs and return the writes for values that changed.
    pub fn recompute(&mut self, ctx: &OutputContext) -> Vec<OutputWrite> {
        self.apply(ctx, false)
    }

    /// Recompute and write every output regardless of the last applied value.
    pub fn apply_all(&mut self, ctx: &OutputContext) -> Vec<OutputWrite> {
        self.apply(ctx, true)
    }

    fn apply(&mut self, ctx: &OutputContext, force: bool) -> Vec<OutputWrite> {
        let mut writes = Vec::new();
        for def in &self.outputs {
            let value = Self::target(def, ctx);
            if !force && self.applied.get(&def.id) == Some(&value) {
                continue;
            }
            debug!("Output {} ({}) <- {:?}", def.id, def.kind.description(), value);
            self.applied.insert(def.id.clone(), value.clone());
            writes.push(OutputWrite::new(def.id.clone(), value));
        }
        writes
    }

    /// Last applied value per output identifier.
    pub fn status(&self) -> &BTreeMap<String, OutputValue> {
        &self.applied
    }
}
