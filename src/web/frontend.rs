//! Embedded HTML/CSS/JS form page for the airplot server.
//!
//! The page is compiled into the binary as a string constant. City and week
//! options are loaded from `/api/health` and `/api/weeks` at startup.

/// The complete single-page form UI.
pub const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>airplot</title>
<style>
:root {
  --bg: #0d1117;
  --surface: #161b22;
  --border: #30363d;
  --text: #e6edf3;
  --text-muted: #8b949e;
  --accent: #58a6ff;
  --red: #f85149;
  --radius: 8px;
  --font: -apple-system, BlinkMacSystemFont, 'Segoe UI', Helvetica, Arial, sans-serif;
}

* { margin: 0; padding: 0; box-sizing: border-box; }
body {
  background: var(--bg);
  color: var(--text);
  font-family: var(--font);
  font-size: 14px;
  line-height: 1.5;
}

.app { max-width: 1100px; margin: 0 auto; padding: 24px; }

header {
  margin-bottom: 24px;
  padding-bottom: 16px;
  border-bottom: 1px solid var(--border);
}
header h1 { font-size: 24px; font-weight: 600; }
header .subtitle { color: var(--text-muted); font-size: 13px; }

.panels { display: grid; grid-template-columns: repeat(auto-fit, minmax(320px, 1fr)); gap: 16px; }

form {
  background: var(--surface);
  border: 1px solid var(--border);
  border-radius: var(--radius);
  padding: 16px;
  display: flex;
  flex-direction: column;
  gap: 10px;
}
form h2 { font-size: 16px; font-weight: 600; }
label { display: flex; flex-direction: column; gap: 4px; color: var(--text-muted); font-size: 12px; }
select, input {
  background: var(--bg);
  color: var(--text);
  border: 1px solid var(--border);
  border-radius: 6px;
  padding: 6px 8px;
  font-size: 14px;
}
button {
  background: var(--accent);
  color: var(--bg);
  border: none;
  border-radius: 6px;
  padding: 8px;
  font-weight: 600;
  cursor: pointer;
}
button:disabled { opacity: 0.5; cursor: wait; }
.hidden { display: none; }
.error { color: var(--red); font-size: 13px; min-height: 1em; }

#output {
  margin-top: 24px;
  background: var(--surface);
  border: 1px solid var(--border);
  border-radius: var(--radius);
  padding: 16px;
  min-height: 120px;
}
#output img { max-width: 100%; }
#output iframe { width: 100%; height: 600px; border: none; background: #fff; }
</style>
</head>
<body>
<div class="app">
<header>
  <h1>airplot</h1>
  <div class="subtitle">Sentinel-5P pollutant maps, time series and nightlight plots</div>
</header>

<div class="panels">
  <form id="pollution-form" data-endpoint="/pollution-data" data-prefix="">
    <h2>Pollution map</h2>
    <label>City <select name="city" class="cities"></select></label>
    <label>Pollutant
      <select name="pollutant"><option>CO</option><option>HCHO</option><option selected>NO2</option><option>SO2</option></select>
    </label>
    <label>Plot type
      <select name="plotType"><option value="Map">Map</option><option value="TimeSeries">Time series (PNG)</option></select>
    </label>
    <div class="duration"></div>
    <button type="submit">Plot</button>
    <div class="error"></div>
  </form>

  <form id="time-series-form" data-endpoint="/time-series-data" data-prefix="timeSeries">
    <h2>Interactive time series</h2>
    <label>City <select name="timeSeriesCity" class="cities"></select></label>
    <label>Pollutant
      <select name="timeSeriesPollutant"><option>CO</option><option>HCHO</option><option selected>NO2</option><option>SO2</option></select>
    </label>
    <div class="duration"></div>
    <button type="submit">Plot</button>
    <div class="error"></div>
  </form>

  <form id="ntl-form" data-endpoint="/ntl-data">
    <h2>Nightlight radiance</h2>
    <label>City <select name="ntlCity" class="cities"></select></label>
    <label>Year <input name="ntlYear" type="number" min="2018" max="2025" value="2022"></label>
    <label>Half year
      <select name="halfYear"><option>jan-jun</option><option>jul-dec</option><option>jan-dec</option></select>
    </label>
    <button type="submit">Plot</button>
    <div class="error"></div>
  </form>
</div>

<div id="output">Submit a form to render a plot.</div>
</div>

<script>
const MONTHS = ['january','february','march','april','may','june','july','august','september','october','november','december'];
const SEASONS = ['march-may','june-august','september-november','december-february'];
let WEEKS = [];

function field(prefix, name) {
  if (!prefix) return name;
  return prefix + name.charAt(0).toUpperCase() + name.slice(1);
}

function options(values) {
  return values.map(v => `<option value="${v}">${v}</option>`).join('');
}

function renderDuration(form) {
  const p = form.dataset.prefix;
  const box = form.querySelector('.duration');
  box.innerHTML = `
    <label>Duration
      <select name="${field(p, 'duration')}">${options(['Date','Year','Month','Season','Week'])}</select>
    </label>
    <label data-mode="Date">Start <input type="date" name="${field(p, 'startDate')}" min="2018-04-30" max="2025-06-05"></label>
    <label data-mode="Date">End <input type="date" name="${field(p, 'endDate')}" min="2018-04-30" max="2025-06-05"></label>
    <label data-mode="Year Month Season">Year <input type="number" name="${field(p, 'year')}" min="2018" max="2025" value="2020"></label>
    <label data-mode="Month">Month <select data-timeframe>${options(MONTHS)}</select></label>
    <label data-mode="Season">Season <select data-timeframe>${options(SEASONS)}</select></label>
    <label data-mode="Week">Week <select data-timeframe class="weeks"></select></label>`;
  const mode = box.querySelector('select');
  mode.addEventListener('change', () => syncDuration(form));
  syncDuration(form);
}

function syncDuration(form) {
  const p = form.dataset.prefix;
  const mode = form.querySelector(`[name="${field(p, 'duration')}"]`).value;
  form.querySelectorAll('[data-mode]').forEach(el => {
    const active = el.dataset.mode.split(' ').includes(mode);
    el.classList.toggle('hidden', !active);
    const tf = el.querySelector('[data-timeframe]');
    if (tf) tf.name = active ? field(p, 'timeframe') : '';
  });
}

async function submit(form, event) {
  event.preventDefault();
  const button = form.querySelector('button');
  const error = form.querySelector('.error');
  const output = document.getElementById('output');
  const body = {};
  new FormData(form).forEach((v, k) => { if (k) body[k] = v; });

  button.disabled = true;
  error.textContent = '';
  try {
    const res = await fetch(form.dataset.endpoint, {
      method: 'POST',
      headers: { 'Content-Type': 'application/json' },
      body: JSON.stringify(body),
    });
    if (!res.ok) {
      const err = await res.json().catch(() => ({ error: res.statusText }));
      throw new Error(err.error || res.statusText);
    }
    const type = res.headers.get('Content-Type') || '';
    if (type.startsWith('image/png')) {
      const url = URL.createObjectURL(await res.blob());
      output.innerHTML = `<img src="${url}" alt="plot">`;
    } else if (type.startsWith('application/json')) {
      const data = await res.json();
      output.innerHTML = `<img src="data:image/png;base64,${data.ntlPlot}" alt="nightlight plot">`;
    } else {
      const frame = document.createElement('iframe');
      frame.srcdoc = await res.text();
      output.replaceChildren(frame);
    }
  } catch (e) {
    error.textContent = e.message;
  } finally {
    button.disabled = false;
  }
}

async function init() {
  const [health, weeks] = await Promise.all([
    fetch('/api/health').then(r => r.json()).catch(() => ({ cities: [] })),
    fetch('/api/weeks').then(r => r.json()).catch(() => ({ weeks: [] })),
  ]);
  WEEKS = weeks.weeks || [];
  document.querySelectorAll('form').forEach(form => {
    if (form.querySelector('.duration')) renderDuration(form);
    form.addEventListener('submit', e => submit(form, e));
  });
  document.querySelectorAll('.cities').forEach(sel => { sel.innerHTML = options(health.cities || []); });
  document.querySelectorAll('.weeks').forEach(sel => {
    sel.innerHTML = WEEKS.map(w => `<option value="${w.token}">${w.label}</option>`).join('');
  });
}

init();
</script>
</body>
</html>
"##;
