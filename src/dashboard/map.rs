//! Self-contained Leaflet map page.

use crate::geo::Coordinate;
use crate::inference::{LabelSet, hex_color};
use crate::output::{CollectionSummary, Feature, FeatureCollection};
use crate::pipeline::annotated_path_for;
use crate::utils::html::escape;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

const LEAFLET_CSS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.css";
const LEAFLET_JS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js";

/// Page rendering options.
#[derive(Debug, Clone)]
pub struct MapOptions {
    /// Page title.
    pub title: String,
    /// Initial center when there are no markers.
    pub center: Coordinate,
    /// Initial zoom.
    pub zoom: u8,
    /// Directory holding annotated images to embed in popups.
    pub image_dir: Option<PathBuf>,
    /// Class ids initially shown; `None` shows all.
    pub label_filter: Option<Vec<u32>>,
    /// Include the control panel that talks to the dashboard API.
    pub interactive: bool,
}

#[derive(Debug, Serialize)]
struct MarkerData {
    lat: f64,
    lon: f64,
    labels: Vec<u32>,
    tooltip: String,
    popup: String,
}

#[derive(Debug, Serialize)]
struct LegendEntry {
    id: u32,
    name: String,
    color: String,
    checked: bool,
}

/// Everything the page script needs, also served by the markers endpoint.
#[derive(Debug, Serialize)]
pub struct MapData {
    center: [f64; 2],
    zoom: u8,
    interactive: bool,
    markers: Vec<MarkerData>,
    legend: Vec<LegendEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<CollectionSummary>,
}

impl MapData {
    /// Number of markers.
    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }
}

/// Render `collection` as an HTML page.
///
/// `labels` supplies names for features without one and the marker colors.
pub fn render_map(collection: &FeatureCollection, labels: &LabelSet, options: &MapOptions) -> String {
    let json = serde_json::to_string(&map_data(collection, labels, options))
        .unwrap_or_else(|_| "{}".to_string())
        .replace("</", "<\\/");

    PAGE_TEMPLATE
        .replace("__TITLE__", &escape(&options.title))
        .replace("__LEAFLET_CSS__", LEAFLET_CSS)
        .replace("__LEAFLET_JS__", LEAFLET_JS)
        .replace("__PAGE_DATA__", &json)
}

/// Marker, legend and summary data for `collection`.
pub fn map_data(collection: &FeatureCollection, labels: &LabelSet, options: &MapOptions) -> MapData {
    let names = legend_names(collection, labels);
    let legend = names
        .iter()
        .map(|(id, name)| LegendEntry {
            id: *id,
            name: name.clone(),
            color: hex_color(labels.color(*id)),
            checked: options
                .label_filter
                .as_ref()
                .is_none_or(|filter| filter.contains(id)),
        })
        .collect();

    let markers: Vec<MarkerData> = collection
        .features
        .iter()
        .map(|feature| marker_data(feature, &names, labels, options.image_dir.as_deref()))
        .collect();

    let center = collection
        .features
        .first()
        .map_or(options.center, Feature::coordinate);

    MapData {
        center: [center.lat, center.lon],
        zoom: options.zoom,
        interactive: options.interactive,
        markers,
        legend,
        summary: collection.summary.clone(),
    }
}

fn legend_names(collection: &FeatureCollection, labels: &LabelSet) -> BTreeMap<u32, String> {
    let mut names: BTreeMap<u32, String> = labels
        .iter()
        .map(|(id, name)| (id, name.to_string()))
        .collect();
    for (id, name) in collection.label_names() {
        let entry = names.entry(id).or_default();
        if entry.is_empty() {
            *entry = if name.is_empty() { labels.name(id) } else { name };
        }
    }
    names
}

fn marker_data(
    feature: &Feature,
    names: &BTreeMap<u32, String>,
    labels: &LabelSet,
    image_dir: Option<&Path>,
) -> MarkerData {
    let location = feature.coordinate();
    let props = &feature.properties;
    let name_of = |id: u32, stored: &str| -> String {
        if stored.is_empty() {
            names.get(&id).cloned().unwrap_or_else(|| labels.name(id))
        } else {
            stored.to_string()
        }
    };

    let mut popup = format!(
        "<div class=\"popup\"><h4>{:.6}, {:.6}</h4>",
        location.lat, location.lon
    );
    if let Some(src) = image_dir.and_then(|dir| embedded_image(dir, &props.image)) {
        popup.push_str(&format!(
            "<img src=\"{src}\" alt=\"{}\">",
            escape(&props.image_id)
        ));
    }
    popup.push_str(&format!(
        "<p><b>Image ID:</b> {}</p>",
        escape(&props.image_id)
    ));
    for stats in &props.labels {
        popup.push_str(&format!(
            "<div class=\"label\" style=\"border-color:{}\"><b>{}</b><br>\
             Confidence: {:.1}% (min {:.1}%, max {:.1}%)<br>Count: {}</div>",
            hex_color(labels.color(stats.label)),
            escape(&name_of(stats.label, &stats.name)),
            stats.avg_confidence * 100.0,
            stats.min_confidence * 100.0,
            stats.max_confidence * 100.0,
            stats.count
        ));
    }
    popup.push_str("</div>");

    let tooltip = props
        .labels
        .iter()
        .map(|s| name_of(s.label, &s.name))
        .collect::<Vec<_>>()
        .join(", ");

    MarkerData {
        lat: location.lat,
        lon: location.lon,
        labels: props.labels.iter().map(|s| s.label).collect(),
        tooltip: if tooltip.is_empty() {
            location.short_label()
        } else {
            tooltip
        },
        popup,
    }
}

/// Data URI of the annotated copy of `image`, if it exists.
///
/// Only plain file names resolve; anything with a directory part is ignored.
fn embedded_image(image_dir: &Path, image: &str) -> Option<String> {
    let name = Path::new(image);
    if name.file_name()? != name.as_os_str() || image.contains(['/', '\\']) {
        debug!("Not embedding marker image {image:?}");
        return None;
    }
    let path = annotated_path_for(name, image_dir);
    let bytes = std::fs::read(&path).ok()?;
    let mime = match path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("bmp") => "image/bmp",
        Some("tif" | "tiff") => "image/tiff",
        _ => "image/jpeg",
    };
    debug!("Embedding {} in popup", path.display());
    Some(format!("data:{mime};base64,{}", STANDARD.encode(bytes)))
}

const PAGE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>__TITLE__</title>
<link rel="stylesheet" href="__LEAFLET_CSS__">
<style>
  html, body { margin: 0; height: 100%; font-family: sans-serif; }
  #map { position: absolute; top: 0; bottom: 0; left: 0; right: 320px; }
  #panel { position: absolute; top: 0; bottom: 0; right: 0; width: 300px; padding: 10px;
           overflow-y: auto; background: #f7f7f7; border-left: 1px solid #ccc; }
  #panel h2 { margin-top: 0; font-size: 1.2em; }
  #panel label { display: block; margin: 4px 0; }
  #panel input[type=number], #panel input[type=text], #panel select { width: 100%; box-sizing: border-box; }
  #panel button { margin-top: 6px; width: 100%; }
  .swatch { display: inline-block; width: 12px; height: 12px; margin-right: 4px; vertical-align: middle; }
  .popup img { max-width: 280px; display: block; margin: 4px 0; }
  .popup .label { border-left: 4px solid; padding-left: 6px; margin: 4px 0; }
  #status { white-space: pre-wrap; font-size: 0.9em; }
  .hidden { display: none; }
</style>
</head>
<body>
<div id="map"></div>
<div id="panel">
  <h2>__TITLE__</h2>
  <div id="controls" class="hidden">
    <label>Mode
      <select id="mode">
        <option value="preloaded">Pre-loaded images</option>
        <option value="fetch">Download &amp; process</option>
      </select>
    </label>
    <label>Confidence threshold <input id="threshold" type="number" min="0" max="1" step="0.01" value="0.74"></label>
    <div id="fetch-controls" class="hidden">
      <label>Search location <input id="place" type="text" placeholder="City or address"></label>
      <button id="search">Search</button>
      <label>Latitude <input id="lat" type="number" step="any"></label>
      <label>Longitude <input id="lon" type="number" step="any"></label>
      <label>Radius (km) <input id="radius" type="number" min="0.1" max="5" step="0.1" value="1.0"></label>
    </div>
    <button id="run">Run inference on pre-loaded images</button>
  </div>
  <h3>Detection types</h3>
  <div id="legend"></div>
  <h3>Summary</h3>
  <div id="status"></div>
</div>
<script src="__LEAFLET_JS__"></script>
<script>
const DATA = __PAGE_DATA__;
const map = L.map('map').setView(DATA.center, DATA.zoom);
L.tileLayer('https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png', {
  maxZoom: 19,
  attribution: '&copy; OpenStreetMap contributors'
}).addTo(map);

let layer = L.layerGroup().addTo(map);
let markers = DATA.markers;
const legend = DATA.legend;

function colorOf(id) {
  const entry = legend.find(l => l.id === id);
  return entry ? entry.color : '#555555';
}

function activeIds() {
  return legend.filter(l => l.checked).map(l => l.id);
}

function drawMarkers() {
  layer.clearLayers();
  const active = activeIds();
  for (const m of markers) {
    if (m.labels.length && !m.labels.some(id => active.includes(id))) continue;
    const color = m.labels.length ? colorOf(m.labels[0]) : '#555555';
    L.circleMarker([m.lat, m.lon], { radius: 7, color: color, fillOpacity: 0.8 })
      .bindTooltip(m.tooltip)
      .bindPopup(m.popup, { maxWidth: 320 })
      .addTo(layer);
  }
}

function drawLegend() {
  const box = document.getElementById('legend');
  box.innerHTML = '';
  for (const l of legend) {
    const row = document.createElement('label');
    const check = document.createElement('input');
    check.type = 'checkbox';
    check.checked = l.checked;
    check.onchange = () => { l.checked = check.checked; drawMarkers(); };
    const swatch = document.createElement('span');
    swatch.className = 'swatch';
    swatch.style.background = l.color;
    row.append(check, swatch, document.createTextNode(l.name));
    box.appendChild(row);
  }
}

function showSummary(s) {
  const status = document.getElementById('status');
  if (!s) { status.textContent = 'No detections.'; return; }
  if ('total_images' in s) {
    status.textContent = `Images: ${s.total_images}\nDetections: ${s.total_detections}\n` +
      `Labels: ${s.unique_labels.join(', ') || 'none'}`;
  } else {
    status.textContent = `Images: ${s.image_count}\nDetections: ${s.detection_count}\n` +
      `Mean confidence: ${(s.mean_confidence * 100).toFixed(1)}%\n` +
      `Labels: ${s.labels.join(', ') || 'none'}`;
  }
}

map.on('click', e => {
  const lat = e.latlng.lat.toFixed(6);
  const lon = e.latlng.lng.toFixed(6);
  L.popup().setLatLng(e.latlng).setContent(`Latitude: ${lat}<br>Longitude: ${lon}`).openOn(map);
  if (DATA.interactive) {
    document.getElementById('lat').value = lat;
    document.getElementById('lon').value = lon;
  }
});

async function api(method, url, body) {
  const opts = { method: method, headers: {} };
  if (body) {
    opts.headers['Content-Type'] = 'application/json';
    opts.body = JSON.stringify(body);
  }
  const res = await fetch(url, opts);
  const json = await res.json().catch(() => ({}));
  if (!res.ok) throw new Error(json.error || res.statusText);
  return json;
}

async function refreshMarkers() {
  const mode = document.getElementById('mode').value;
  const collection = await api('GET', `/api/markers?mode=${mode}`);
  markers = collection.markers;
  for (const l of collection.legend) {
    if (!legend.some(e => e.id === l.id)) legend.push(l);
  }
  drawLegend();
  drawMarkers();
  showSummary(collection.summary);
}

if (DATA.interactive) {
  document.getElementById('controls').classList.remove('hidden');
  const mode = document.getElementById('mode');
  const run = document.getElementById('run');
  mode.onchange = () => {
    const fetchMode = mode.value === 'fetch';
    document.getElementById('fetch-controls').classList.toggle('hidden', !fetchMode);
    run.textContent = fetchMode ? 'Download & process' : 'Run inference on pre-loaded images';
    refreshMarkers().catch(err => { document.getElementById('status').textContent = err.message; });
  };
  document.getElementById('search').onclick = async () => {
    const q = document.getElementById('place').value;
    try {
      const place = await api('GET', `/api/geocode?q=${encodeURIComponent(q)}`);
      document.getElementById('lat').value = place.location.lat.toFixed(6);
      document.getElementById('lon').value = place.location.lon.toFixed(6);
      map.setView([place.location.lat, place.location.lon], 15);
    } catch (err) {
      document.getElementById('status').textContent = err.message;
    }
  };
  run.onclick = async () => {
    const status = document.getElementById('status');
    const threshold = parseFloat(document.getElementById('threshold').value);
    run.disabled = true;
    status.textContent = 'Running...';
    try {
      let outcome;
      if (mode.value === 'fetch') {
        outcome = await api('POST', '/api/fetch', {
          lat: parseFloat(document.getElementById('lat').value),
          lon: parseFloat(document.getElementById('lon').value),
          radius_km: parseFloat(document.getElementById('radius').value),
          threshold: threshold
        });
      } else {
        outcome = await api('POST', '/api/infer', { threshold: threshold });
      }
      await refreshMarkers();
      if (outcome.fetch && outcome.fetch.coverage === 'no_coverage') {
        status.textContent = 'No imagery available in this area.';
      } else {
        showSummary(outcome.summary);
      }
    } catch (err) {
      status.textContent = err.message;
    } finally {
      run.disabled = false;
    }
  };
}

drawLegend();
drawMarkers();
showSummary(DATA.summary);
</script>
</body>
</html>
"#;
