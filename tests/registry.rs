use std::sync::Arc;

use esp_lcd_bus::backend::SimPanel;
use esp_lcd_bus::registry::BusId;
use esp_lcd_bus::registry::BusKind;
use esp_lcd_bus::registry::BusRegistry;
use esp_lcd_bus::BusConfig;
use esp_lcd_bus::Error;
use esp_lcd_bus::FrameBuffer;
use esp_lcd_bus::LcdBus;
use esp_lcd_bus::MemoryCaps;
use esp_lcd_bus::PixelRegion;

#[test]
fn test_global_registry_hands_out_running_buses() {
    let panel = SimPanel::new();
    let sim = panel.handle();
    let bus = Arc::new(LcdBus::new(panel));
    bus.init(BusConfig::new(2, 2, 8).name("spi2-panel")).unwrap();

    let id = BusId::new(BusKind::Spi, 2);
    let registry = BusRegistry::global();
    registry.insert(id, Arc::clone(&bus)).unwrap();
    assert_eq!(
        registry.insert(id, Arc::new(LcdBus::new(SimPanel::new()))),
        Err(Error::InvalidState)
    );

    let found = registry.get(id).unwrap();
    let buffer = FrameBuffer::from_vec(vec![4; 4], MemoryCaps::NONE).into_shared();
    found
        .flush(PixelRegion::new(0, 0, 1, 1), buffer, true)
        .unwrap();
    assert_eq!(sim.screen(), vec![4; 4]);

    drop(found);
    drop(bus);
    let last = registry.remove(id).unwrap();
    assert!(registry.get(id).is_none());
    drop(last);
    assert!(sim.is_deleted());
}
