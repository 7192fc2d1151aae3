//! Playwright browser automation
//!
//! Every driver operation generates a standalone Node script that replays
//! the scenario's actions so far and then performs the operation. Results
//! come back as a JSON line on stdout.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tokio::process::Command as TokioCommand;
use tracing::debug;

use crate::error::{OracleError, OracleResult};
use crate::page::{CaptureTarget, LoadState, PageDriver, ProbeSet, Viewport, WaitState};
use crate::snapshot::DomSnapshot;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl std::str::FromStr for Browser {
    type Err = OracleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chromium" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" => Ok(Browser::Webkit),
            other => Err(OracleError::Playwright(format!("unknown browser '{}'", other))),
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaywrightConfig {
    /// Where the dashboard is served
    pub base_url: String,
    /// Directory whose node_modules provides `playwright`
    pub project_dir: PathBuf,
    /// Staging directory for raw captures
    pub screenshot_dir: PathBuf,
    pub browser: Browser,
    pub headless: bool,
    pub node_binary: String,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:4200".to_string(),
            project_dir: PathBuf::from("."),
            screenshot_dir: PathBuf::from("test-results/captures"),
            browser: Browser::Chromium,
            headless: true,
            node_binary: "node".to_string(),
        }
    }
}

/// Actions replayed at the start of every script
#[derive(Debug, Clone, PartialEq)]
enum Action {
    Goto(String),
    WaitForLoad(LoadState),
    WaitFor {
        selector: String,
        state: WaitState,
        timeout_ms: u64,
    },
    Fill { selector: String, value: String },
    Select { selector: String, value: String },
    Click { selector: String },
    Settle(u64),
}

/// What a script does after the replay
enum Operation<'a> {
    Replay,
    Snapshot(&'a ProbeSet),
    Screenshot { target: &'a CaptureTarget, path: PathBuf },
}

#[derive(Debug, Deserialize)]
struct ScriptOutput {
    #[serde(default)]
    snapshot: Option<DomSnapshot>,
}

#[derive(Debug, Deserialize)]
struct ScriptFailure {
    #[serde(default)]
    name: String,
    #[serde(default)]
    error: String,
}

/// Playwright-backed page driver
pub struct PlaywrightDriver {
    config: PlaywrightConfig,
    viewport: Viewport,
    actions: Vec<Action>,
    animations_disabled: bool,
    captures: u32,
    /// Set once `npx playwright` has answered
    installed: bool,
}

impl PlaywrightDriver {
    /// Create a driver. The Playwright install is checked before the first
    /// script runs.
    pub fn new(config: PlaywrightConfig) -> OracleResult<Self> {
        std::fs::create_dir_all(&config.screenshot_dir)?;

        Ok(Self {
            config,
            viewport: Viewport::default(),
            actions: Vec::new(),
            animations_disabled: false,
            captures: 0,
            installed: false,
        })
    }

    async fn ensure_installed(&mut self) -> OracleResult<()> {
        if self.installed {
            return Ok(());
        }

        let status = TokioCommand::new("npx")
            .args(["playwright", "--version"])
            .current_dir(&self.config.project_dir)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await;

        match status {
            Ok(status) if status.success() => {
                self.installed = true;
                Ok(())
            }
            _ => Err(OracleError::PlaywrightNotFound),
        }
    }

    fn build_script(&self, actions: &[Action], op: &Operation<'_>) -> String {
        let mut script = String::new();

        script.push_str(&format!(
            r#"
const {{ chromium, firefox, webkit }} = require(require.resolve('playwright', {{ paths: [process.cwd()] }}));

(async () => {{
  const browser = await {browser}.launch({{ headless: {headless} }});
  const context = await browser.newContext({{
    viewport: {{ width: {width}, height: {height} }}
  }});
  const page = await context.newPage();
  const baseUrl = {base_url};

  try {{
"#,
            browser = self.config.browser.as_str(),
            headless = self.config.headless,
            width = self.viewport.width,
            height = self.viewport.height,
            base_url = js_str(&self.config.base_url),
        ));

        for (i, action) in actions.iter().enumerate() {
            script.push_str(&format!("\n    // Action {}\n", i + 1));
            script.push_str(&action_to_js(action));
            script.push('\n');
        }

        if self.animations_disabled {
            script.push_str(
                "\n    await page.addStyleTag({ content: '*, *::before, *::after { animation: none !important; transition: none !important; caret-color: transparent !important; }' });\n",
            );
        }

        script.push_str(&self.operation_to_js(op));

        script.push_str(
            r#"
  } catch (error) {
    console.error(JSON.stringify({ success: false, name: error.name, error: error.message }));
    process.exitCode = 1;
  } finally {
    await browser.close();
  }
})();
"#,
        );

        script
    }

    fn operation_to_js(&self, op: &Operation<'_>) -> String {
        match op {
            Operation::Replay => "\n    console.log(JSON.stringify({ success: true }));\n".to_string(),
            Operation::Snapshot(probes) => {
                let probes_json = serde_json::to_string(probes).unwrap_or_else(|_| "{}".to_string());
                format!(
                    r#"
    const probes = {probes};
    const elements = {{}};
    for (const [selector, probe] of Object.entries(probes)) {{
      elements[selector] = await page.locator(selector).evaluateAll((els, probe) => els.map((el) => {{
        const cs = window.getComputedStyle(el);
        const r = el.getBoundingClientRect();
        const styles = {{}};
        for (const p of probe.styles) styles[p] = cs[p];
        const attributes = {{}};
        for (const a of probe.attributes) {{
          const v = el.getAttribute(a);
          if (v !== null) attributes[a] = v;
        }}
        const visible = r.width > 0 && r.height > 0 && cs.visibility !== 'hidden';
        return {{
          text: (el.textContent || '').replace(/\s+/g, ' ').trim(),
          value: typeof el.value === 'string' ? el.value : undefined,
          attributes,
          styles,
          disabled: !!el.disabled || el.getAttribute('aria-disabled') === 'true',
          visible,
          bounds: visible ? {{ x: r.x, y: r.y, width: r.width, height: r.height }} : undefined,
        }};
      }}), probe);
    }}
    console.log(JSON.stringify({{ success: true, snapshot: {{ url: page.url(), viewport: page.viewportSize(), elements }} }}));
"#,
                    probes = probes_json,
                )
            }
            Operation::Screenshot { target, path } => {
                let animations = if self.animations_disabled {
                    ", animations: 'disabled'"
                } else {
                    ""
                };
                let path = js_str(&path.to_string_lossy());
                let capture = match target {
                    CaptureTarget::Viewport => format!(
                        "await page.screenshot({{ path: {}, fullPage: false{} }});",
                        path, animations
                    ),
                    CaptureTarget::FullPage => format!(
                        "await page.screenshot({{ path: {}, fullPage: true{} }});",
                        path, animations
                    ),
                    CaptureTarget::Element(selector) => format!(
                        "await page.locator({}).first().screenshot({{ path: {}{} }});",
                        js_str(selector),
                        path,
                        animations
                    ),
                };
                format!(
                    "\n    {}\n    console.log(JSON.stringify({{ success: true }}));\n",
                    capture
                )
            }
        }
    }

    /// Run a script via node and return its last JSON stdout line
    async fn run_script(&mut self, what: &str, script: &str) -> OracleResult<ScriptOutput> {
        self.ensure_installed().await?;

        let temp_dir = tempfile::tempdir()?;
        let script_path = temp_dir.path().join("refdash.js");
        std::fs::write(&script_path, script)?;

        debug!("Running Playwright script for {}: {}", what, script_path.display());

        let output = TokioCommand::new(&self.config.node_binary)
            .arg(&script_path)
            .current_dir(&self.config.project_dir)
            .kill_on_drop(true)
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let failure = last_json_line(&stderr)
                .and_then(|line| serde_json::from_str::<ScriptFailure>(line).ok());
            return Err(match failure {
                Some(f) if f.name == "TimeoutError" => OracleError::Timeout(format!("{}: {}", what, f.error)),
                Some(f) => OracleError::Playwright(format!("{} failed: {}", what, f.error)),
                None => OracleError::Playwright(format!(
                    "{} failed:\nstdout: {}\nstderr: {}",
                    what, stdout, stderr
                )),
            });
        }

        let line = last_json_line(&stdout)
            .ok_or_else(|| OracleError::Playwright(format!("{}: no result on stdout", what)))?;
        Ok(serde_json::from_str(line)?)
    }

    /// Run an action, keeping it in the replay log only if it succeeded
    async fn perform(&mut self, what: &str, action: Action) -> OracleResult<()> {
        let mut actions = self.actions.clone();
        actions.push(action.clone());
        let script = self.build_script(&actions, &Operation::Replay);
        self.run_script(what, &script).await?;
        self.actions.push(action);
        Ok(())
    }
}

fn action_to_js(action: &Action) -> String {
    match action {
        Action::Goto(url) => format!("    await page.goto(baseUrl + {});", js_str(url)),
        Action::WaitForLoad(state) => {
            format!("    await page.waitForLoadState('{}');", state.as_str())
        }
        Action::WaitFor {
            selector,
            state,
            timeout_ms,
        } => format!(
            "    await page.waitForSelector({}, {{ state: '{}', timeout: {} }});",
            js_str(selector),
            state.as_str(),
            timeout_ms
        ),
        Action::Fill { selector, value } => format!(
            "    await page.locator({}).first().fill({});",
            js_str(selector),
            js_str(value)
        ),
        Action::Select { selector, value } => format!(
            "    await page.locator({}).first().selectOption({});",
            js_str(selector),
            js_str(value)
        ),
        Action::Click { selector } => {
            format!("    await page.locator({}).first().click();", js_str(selector))
        }
        Action::Settle(ms) => format!("    await page.waitForTimeout({});", ms),
    }
}

/// JavaScript string literal
fn js_str(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

fn last_json_line(output: &str) -> Option<&str> {
    output
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| line.starts_with('{'))
}

#[async_trait]
impl PageDriver for PlaywrightDriver {
    async fn navigate(&mut self, url: &str) -> OracleResult<()> {
        self.perform(&format!("navigate:{}", url), Action::Goto(url.to_string()))
            .await
    }

    async fn set_viewport(&mut self, viewport: Viewport) -> OracleResult<()> {
        self.viewport = viewport;
        Ok(())
    }

    async fn wait_for_load(&mut self, state: LoadState) -> OracleResult<()> {
        self.perform(&format!("load state {}", state.as_str()), Action::WaitForLoad(state))
            .await
    }

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        state: WaitState,
        timeout: Duration,
    ) -> OracleResult<()> {
        let action = Action::WaitFor {
            selector: selector.to_string(),
            state,
            timeout_ms: timeout.as_millis() as u64,
        };
        self.perform(&format!("'{}' to be {}", selector, state.as_str()), action)
            .await
    }

    async fn fill(&mut self, selector: &str, value: &str) -> OracleResult<()> {
        let action = Action::Fill {
            selector: selector.to_string(),
            value: value.to_string(),
        };
        self.perform(&format!("fill:{}", selector), action).await
    }

    async fn select(&mut self, selector: &str, value: &str) -> OracleResult<()> {
        let action = Action::Select {
            selector: selector.to_string(),
            value: value.to_string(),
        };
        self.perform(&format!("select:{}", selector), action).await
    }

    async fn click(&mut self, selector: &str) -> OracleResult<()> {
        let action = Action::Click {
            selector: selector.to_string(),
        };
        self.perform(&format!("click:{}", selector), action).await
    }

    /// Recorded only; the delay runs in the browser ahead of every later
    /// operation
    async fn settle(&mut self, delay: Duration) -> OracleResult<()> {
        self.actions.push(Action::Settle(delay.as_millis() as u64));
        Ok(())
    }

    async fn disable_animations(&mut self) -> OracleResult<()> {
        self.animations_disabled = true;
        Ok(())
    }

    async fn snapshot(&mut self, probes: &ProbeSet) -> OracleResult<DomSnapshot> {
        let script = self.build_script(&self.actions, &Operation::Snapshot(probes));
        let output = self.run_script("snapshot", &script).await?;
        output
            .snapshot
            .ok_or_else(|| OracleError::Playwright("snapshot: script returned no snapshot".to_string()))
    }

    async fn screenshot(&mut self, target: &CaptureTarget) -> OracleResult<RgbaImage> {
        self.captures += 1;
        let path = self
            .config
            .screenshot_dir
            .join(format!("capture-{}-{}.png", std::process::id(), self.captures));

        let op = Operation::Screenshot {
            target,
            path: path.clone(),
        };
        let script = self.build_script(&self.actions, &op);
        self.run_script("screenshot", &script).await?;

        let image = image::open(&path)?.to_rgba8();
        let _ = std::fs::remove_file(&path);
        Ok(image)
    }
}
