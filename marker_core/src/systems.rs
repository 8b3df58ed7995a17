use bevy::prelude::*;

use crate::config_watch::ConfigWatcher;
use crate::layer::MarkerLayer;
use crate::scheduler::SurfaceEvent;

pub fn apply_config_reloads(watcher: Option<Res<ConfigWatcher>>, mut layer: ResMut<MarkerLayer>) {
    let Some(config) = watcher.and_then(|watcher| watcher.latest()) else {
        return;
    };
    layer.apply_config(config);
}

pub fn forward_surface_events(
    time: Res<Time>,
    mut events: EventReader<SurfaceEvent>,
    mut layer: ResMut<MarkerLayer>,
) {
    let now = time.elapsed();
    for event in events.read() {
        layer.handle_surface_event(*event, now);
    }
}

pub fn drive_marker_layer(time: Res<Time>, mut layer: ResMut<MarkerLayer>) {
    layer.tick(time.elapsed());
}
