//! Browser bindings. Values cross the boundary through serde; errors are
//! thrown as `{code, message}` objects.

use serde::Serialize;
use wasm_bindgen::prelude::*;

use crate::config::HarnessConfig;
use crate::error::ArenaError;
use crate::harness::{self, Harness};
use crate::registry::StoredStrategy;

#[derive(Serialize)]
struct JsError {
    code: &'static str,
    message: String,
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value).map_err(JsValue::from)
}

fn throw(err: ArenaError) -> JsValue {
    let payload = JsError {
        code: err.code(),
        message: err.to_string(),
    };
    serde_wasm_bindgen::to_value(&payload).unwrap_or_else(|_| JsValue::from_str(&payload.message))
}

#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Built-in stage definitions.
#[wasm_bindgen]
pub fn stages() -> Result<JsValue, JsValue> {
    to_js(&harness::stages())
}

#[wasm_bindgen]
pub struct Arena {
    inner: Harness,
}

#[wasm_bindgen]
impl Arena {
    /// `config_json` may be empty for defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &str) -> Result<Arena, JsValue> {
        let config = HarnessConfig::from_json(config_json).map_err(|e| throw(e.into()))?;
        Ok(Arena {
            inner: Harness::new(config),
        })
    }

    #[wasm_bindgen(js_name = registerStrategy)]
    pub fn register_strategy(&mut self, name: &str, source: &str) -> Result<(), JsValue> {
        self.inner.register_strategy(name, source).map_err(throw)
    }

    /// Returns the generated strategy name.
    #[wasm_bindgen(js_name = uploadIntelligentSystem)]
    pub fn upload_intelligent_system(
        &mut self,
        system: &str,
        source: &str,
        stage: &str,
    ) -> Result<String, JsValue> {
        self.inner
            .upload_intelligent_system(system, source, stage)
            .map_err(throw)
    }

    #[wasm_bindgen(js_name = deleteStrategy)]
    pub fn delete_strategy(&mut self, name: &str) -> Result<(), JsValue> {
        self.inner.delete_strategy(name).map_err(throw)
    }

    #[wasm_bindgen(js_name = listStrategies)]
    pub fn list_strategies(&self) -> Result<JsValue, JsValue> {
        to_js(&self.inner.list_strategies())
    }

    #[wasm_bindgen(js_name = strategySource)]
    pub fn strategy_source(&self, name: &str) -> Option<String> {
        self.inner.strategy_source(name)
    }

    #[wasm_bindgen(js_name = exportStrategies)]
    pub fn export_strategies(&self) -> Result<JsValue, JsValue> {
        to_js(&self.inner.export_strategies())
    }

    /// Returns how many stored strategies were restored.
    #[wasm_bindgen(js_name = restoreStrategies)]
    pub fn restore_strategies(&mut self, stored: JsValue) -> Result<usize, JsValue> {
        let stored: Vec<StoredStrategy> = serde_wasm_bindgen::from_value(stored)?;
        Ok(self.inner.restore(&stored))
    }

    /// `stage` is a built-in name or a stage JSON document; seats are
    /// `"human"` or a strategy name.
    #[wasm_bindgen(js_name = startGame)]
    pub fn start_game(&mut self, stage: &str, black: &str, white: &str) -> Result<JsValue, JsValue> {
        let state = self.inner.start_game(stage, black, white).map_err(throw)?;
        to_js(&state)
    }

    pub fn step(&mut self) -> Result<JsValue, JsValue> {
        let outcome = self.inner.step().map_err(throw)?;
        to_js(&outcome)
    }

    #[wasm_bindgen(js_name = submitHumanMove)]
    pub fn submit_human_move(&mut self, row: u8, col: u8) -> Result<JsValue, JsValue> {
        let outcome = self.inner.submit_human_move(row, col).map_err(throw)?;
        to_js(&outcome)
    }

    pub fn state(&self) -> Result<JsValue, JsValue> {
        to_js(&self.inner.state())
    }

    #[wasm_bindgen(js_name = legalMoves)]
    pub fn legal_moves(&self) -> Result<JsValue, JsValue> {
        to_js(&self.inner.legal_moves())
    }

    #[wasm_bindgen(js_name = drainMessages)]
    pub fn drain_messages(&mut self) -> Result<JsValue, JsValue> {
        to_js(&self.inner.drain_messages())
    }

    /// The finished game's record, once.
    #[wasm_bindgen(js_name = takeRecord)]
    pub fn take_record(&mut self) -> Result<JsValue, JsValue> {
        to_js(&self.inner.take_record())
    }

    #[wasm_bindgen(js_name = runTournament)]
    pub fn run_tournament(&mut self, stage: &str, names: JsValue) -> Result<JsValue, JsValue> {
        let names: Vec<String> = serde_wasm_bindgen::from_value(names)?;
        let report = self.inner.run_tournament(stage, &names).map_err(throw)?;
        to_js(&report)
    }
}
